#![no_main]

use arbitrary::Arbitrary;
use image_resize_server::path::PathParser;
use image_resize_server::MAX_DIMENSION;
use libfuzzer_sys::fuzz_target;
use std::path::{Component, Path};

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    pattern: u8,
    base_url: &'a str,
    path: &'a str,
}

const PATTERNS: [&str; 3] = [
    "/cache/:width:x:height:/:image:",
    "/thumbnail/:width:x:height:/:any_dir:/:image:",
    "/:height:/:image:",
];

fuzz_target!(|data: Input| {
    let pattern = PATTERNS[data.pattern as usize % PATTERNS.len()];
    let Ok(parser) = PathParser::new(pattern, data.base_url) else {
        return;
    };
    let Ok(parsed) = parser.parse(data.path) else {
        return;
    };

    assert!(parsed.width <= MAX_DIMENSION && parsed.height <= MAX_DIMENSION);
    assert!(parsed.width > 0 || parsed.height > 0);

    // anything accepted must stay below the root it is joined to
    for relative in [&parsed.source, &parsed.target] {
        let joined = Path::new("/root").join(relative.trim_start_matches('/'));
        assert!(joined.starts_with("/root"), "{relative:?}");
        assert!(
            !joined.components().any(|c| matches!(c, Component::ParentDir)),
            "{relative:?}"
        );
    }
});
