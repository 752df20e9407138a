use rand::{rngs::StdRng, Rng, SeedableRng};

use std::{hint::black_box, time::Duration};

use criterion::{criterion_main, BenchmarkId, Criterion};
use outliner_core::{
    entities::{BBox, Block, BlockKind},
    parse::{build_record, titles::title_levels_kmeans},
};

fn get_fake_blocks(count: usize, pages: usize) -> Vec<Block> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut blocks = Vec::with_capacity(count);

    for idx in 0..count {
        let kind = match idx % 5 {
            0 => BlockKind::SectionHeader,
            1 if idx < pages => BlockKind::Title,
            _ => BlockKind::Text,
        };
        let height = match kind {
            BlockKind::SectionHeader => [40.0, 28.0, 20.0][rng.gen_range(0..3)],
            BlockKind::Title => 60.0,
            BlockKind::Text => rng.gen_range(12.0..120.0),
        };
        let x0 = rng.gen_range(50.0..150.0);
        let y0 = rng.gen_range(50.0..1000.0);
        blocks.push(Block {
            kind,
            bbox: BBox {
                x0,
                y0,
                x1: x0 + rng.gen_range(100.0..600.0),
                y1: y0 + height,
            },
            text: format!("Heading number {idx}"),
            confidence: rng.gen_range(0.2..1.0),
            page: idx % pages,
        });
    }
    blocks
}

fn bench_hierarchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy");

    for count in [50, 500, 5000] {
        let blocks = get_fake_blocks(count, count / 25);
        group.bench_with_input(BenchmarkId::new("kmeans", count), &blocks, |b, blocks| {
            b.iter(|| title_levels_kmeans(black_box(blocks), 3))
        });
        group.bench_with_input(
            BenchmarkId::new("build_record", count),
            &blocks,
            |b, blocks| b.iter(|| build_record(black_box(blocks.clone()), 3)),
        );
    }
    group.finish();
}

criterion::criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = bench_hierarchy
}

criterion_main!(benches);
