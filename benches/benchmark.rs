use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image_resize_server::path::{PathParser, DEFAULT_URL_PATTERN};
use image_resize_server::resize::{ProcessBuilder, ResizeOptions};
use std::path::PathBuf;

pub fn parse_benchmark(c: &mut Criterion) {
    let parser = PathParser::new(DEFAULT_URL_PATTERN, "/media/catalog/product").unwrap();

    c.bench_function("parse cache path", |b| {
        b.iter(|| parser.parse(black_box("/media/catalog/product/cache/300x400/a/b/image1.jpg")))
    });
    c.bench_function("reject traversal path", |b| {
        b.iter(|| parser.parse(black_box("/media/catalog/product/cache/300x400/../../etc/passwd")))
    });
}

pub fn build_benchmark(c: &mut Criterion) {
    let options = ResizeOptions {
        sampling_factor: Some("4:2:0".to_string()),
        quality: Some(85),
        interlace: Some("JPEG".to_string()),
        filter: None,
        strip: true,
    };
    let template = ProcessBuilder::new("convert", &options, 10).with_base_path("/srv/cache");

    let entries: Vec<(PathBuf, PathBuf, u32)> = (0..10)
        .map(|i| {
            (
                PathBuf::from(format!("/srv/images/{}.jpg", i % 3)),
                PathBuf::from(format!("/srv/cache/{}x/{}.jpg", 100 + i * 10, i % 3)),
                100 + i * 10,
            )
        })
        .collect();

    c.bench_function("build 10-entry batch", |b| {
        b.iter(|| {
            let mut builder = template.clone();
            for (source, target, size) in &entries {
                builder.push_resize(source, target, *size, *size);
            }
            black_box(builder.build())
        })
    });
}

criterion_group!(benches, parse_benchmark, build_benchmark);
criterion_main!(benches);
