use binlayout::{detect, Palette};
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::fs;
use std::hint::black_box;

/// Synthetic ISOBMFF file with `count` small boxes nested two deep.
fn box_soup(count: usize) -> Vec<u8> {
    let mut moov = Vec::new();
    for i in 0..count {
        let payload = (i as u32).to_be_bytes();
        let mut inner = 12u32.to_be_bytes().to_vec();
        inner.extend_from_slice(b"free");
        inner.extend_from_slice(&payload);
        let mut trak = ((inner.len() + 8) as u32).to_be_bytes().to_vec();
        trak.extend_from_slice(b"trak");
        trak.extend(inner);
        moov.extend(trak);
    }
    let mut data = 16u32.to_be_bytes().to_vec();
    data.extend_from_slice(b"ftypisom\0\0\0\0");
    data.extend(((moov.len() + 8) as u32).to_be_bytes());
    data.extend_from_slice(b"moov");
    data.extend(moov);
    data
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    let soup = Bytes::from(box_soup(10_000));
    group.throughput(Throughput::Bytes(soup.len() as u64));
    group.bench_function("isobmff_10k_boxes", |b| {
        b.iter(|| detect(black_box(soup.clone()), "soup.mp4", Palette::Dark))
    });

    // System binaries, when present.
    let paths = ["/bin/ls", "/usr/bin/env"];
    for p in paths {
        if let Ok(data) = fs::read(p) {
            let data = Bytes::from(data);
            group.throughput(Throughput::Bytes(data.len() as u64));
            group.bench_function(p, |b| {
                b.iter(|| detect(black_box(data.clone()), p, Palette::Dark))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
