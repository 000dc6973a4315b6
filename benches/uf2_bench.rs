use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use uf2tool::{FileOptions, Uf2File};

fn bench_append_and_save(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];

    c.bench_function("append_1mb", |b| {
        b.iter(|| {
            let mut uf2 = Uf2File::new();
            uf2.append_payload(black_box(&data), 0x1000_0000).unwrap();
        })
    });

    c.bench_function("append_save_1mb", |b| {
        b.iter(|| {
            let mut uf2 = Uf2File::new();
            uf2.append_payload(black_box(&data), 0x1000_0000).unwrap();
            uf2.write_to(Cursor::new(Vec::new())).unwrap();
        })
    });
}

fn bench_gap_fill(c: &mut Criterion) {
    let data = vec![7u8; 64 * 1024];

    c.bench_function("save_with_1mb_gap", |b| {
        b.iter(|| {
            let mut uf2 = Uf2File::with_options(FileOptions { fill_gaps: true, ..Default::default() });
            uf2.append_payload(black_box(&data), 0x1010_0000).unwrap();
            uf2.append_payload(black_box(&data), 0x1000_0000).unwrap();
            uf2.write_to(Cursor::new(Vec::new())).unwrap();
        })
    });
}

fn bench_load(c: &mut Criterion) {
    let mut uf2 = Uf2File::new();
    uf2.append_payload(&vec![1u8; 1024 * 1024], 0).unwrap();
    let mut bytes = Vec::new();
    uf2.write_to(&mut bytes).unwrap();

    c.bench_function("load_4096_blocks", |b| {
        b.iter(|| {
            let mut f = Uf2File::new();
            f.read_from(Cursor::new(black_box(&bytes))).unwrap();
        })
    });
}

criterion_group!(benches, bench_append_and_save, bench_gap_fill, bench_load);
criterion_main!(benches);
