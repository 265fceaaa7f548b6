#![no_main]

use arbitrary::Arbitrary;
use image_resize_server::resize::{ProcessBuilder, ResizeOptions};
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;
use std::path::Path;

#[derive(Arbitrary, Debug)]
struct Entry {
    source: u8,
    target: u16,
    width: u16,
    height: u16,
}

#[derive(Arbitrary, Debug)]
struct Input {
    limit: u8,
    quality: Option<u8>,
    strip: bool,
    entries: Vec<Entry>,
}

fuzz_target!(|data: Input| {
    let options = ResizeOptions {
        quality: data.quality,
        strip: data.strip,
        ..ResizeOptions::default()
    };
    let limit = data.limit as usize + 1;
    let mut builder = ProcessBuilder::new("convert", &options, limit);

    let mut targets = HashSet::new();
    for entry in data.entries.iter().take(256) {
        let source = format!("s{}.jpg", entry.source % 8);
        let target = format!("{source}-t{}.jpg", entry.target % 64);
        builder.push_resize(
            Path::new(&source),
            Path::new(&target),
            entry.width as u32,
            entry.height as u32,
        );
        targets.insert(target);
        assert_eq!(builder.len(), targets.len());
        assert_eq!(builder.is_full(), targets.len() >= limit);
    }

    let command = builder.build();
    let writes = command.args.iter().filter(|a| *a == "-write").count();
    assert_eq!(writes, targets.len());
    let opens = command.args.iter().filter(|a| *a == "(").count();
    let closes = command.args.iter().filter(|a| *a == ")").count();
    assert_eq!(opens, closes);
    assert_eq!(command.args.last().map(String::as_str), Some("null:"));
    let _ = command.to_string();
});
