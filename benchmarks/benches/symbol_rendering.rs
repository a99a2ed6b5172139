use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use warden_idgen::SymbolCodec;

fn benchmark_render(c: &mut Criterion) {
    let fixed = SymbolCodec::fixed(6);
    let variable = SymbolCodec::variable();

    let mut group = c.benchmark_group("render");
    for value in [0u64, 61, 238_327, 56_800_235_583, u64::MAX] {
        group.bench_with_input(BenchmarkId::new("fixed_6", value), &value, |b, value| {
            b.iter(|| fixed.render(black_box(*value)))
        });
        group.bench_with_input(BenchmarkId::new("variable", value), &value, |b, value| {
            b.iter(|| variable.render(black_box(*value)))
        });
    }
    group.finish();
}

fn benchmark_parse(c: &mut Criterion) {
    let codec = SymbolCodec::variable();
    let rendered: Vec<String> = (0..1000u64).map(|i| codec.render(i * 7919)).collect();

    c.bench_function("parse_1000_symbols", |b| {
        b.iter(|| {
            for symbol in &rendered {
                let _ = codec.parse(black_box(symbol));
            }
        })
    });

    c.bench_function("parse_u64_max", |b| {
        b.iter(|| codec.parse(black_box("lYGhA16ahyf")))
    });
}

criterion_group!(benches, benchmark_render, benchmark_parse);
criterion_main!(benches);
