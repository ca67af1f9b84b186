//! Configuration parsing benchmarks
//!
//! Covers parsing the INI text and resolving it into a model, for the
//! shipped model configuration and for deep encoder stacks.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nabu::{ConfigFile, ModelConfig};

const MODEL_CFG: &str = include_str!("../configs/model.cfg");

/// A model whose root encoder stacks `depth` listeners
fn stacked_model(depth: usize) -> String {
    let names: Vec<String> = (0..depth).map(|i| format!("listener{i}")).collect();
    let mut text = format!(
        "[io]\ninputs = features\noutputs = text\n\n[encoder]\nencoder = stack_encoder\nencoders = {}\n",
        names.join(" ")
    );
    for name in &names {
        text.push_str(&format!(
            "\n[{name}]\nencoder = listener\nlistener_units = 128\nlistener_layers = 1\npyramid_steps = 0\n"
        ));
    }
    text.push_str("\n[decoder]\ndecoder = speller\nspeller_units = 128\nspeller_layers = 1\n");
    text
}

fn bench_shipped_model(c: &mut Criterion) {
    let mut group = c.benchmark_group("shipped_model");

    group.bench_function("parse", |b| b.iter(|| ConfigFile::parse(black_box(MODEL_CFG))));

    let config = ConfigFile::parse(MODEL_CFG).unwrap();
    group.bench_function("resolve", |b| {
        b.iter(|| ModelConfig::from_config(black_box(&config)))
    });

    group.finish();
}

fn bench_stack_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_depth");

    for depth in [1, 8, 64, 256] {
        let text = stacked_model(depth);
        group.bench_with_input(BenchmarkId::new("parse_and_resolve", depth), &text, |b, t| {
            b.iter(|| ModelConfig::parse(black_box(t)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_shipped_model, bench_stack_depth);
criterion_main!(benches);
