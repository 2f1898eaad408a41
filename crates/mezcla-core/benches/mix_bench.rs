//! Criterion benchmarks for the mezcla mixing path
//!
//! Run with: cargo bench -p mezcla-core
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mezcla_core::mixer::{MixManager, mix_generic, mix_specialized};
use mezcla_core::{
    Backend, ContextAttributes, Engine, EngineSettings, Format, NullBackend, ParamValue,
    SourceParam,
};

const FRAMES: usize = 1024;
const ENTRY_COUNTS: &[usize] = &[1, 2, 3, 4, 8, 16];

fn entries(count: usize) -> Vec<Vec<i16>> {
    (0..count)
        .map(|e| {
            (0..FRAMES * 2)
                .map(|i| ((i * 37 + e * 101) % 20000) as i16 - 10000)
                .collect()
        })
        .collect()
}

fn bench_summation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Summation");
    for &count in ENTRY_COUNTS {
        let input = entries(count);
        let mut out = vec![0i16; FRAMES * 2];
        group.bench_with_input(BenchmarkId::new("generic", count), &count, |b, _| {
            b.iter(|| mix_generic(black_box(&input), &mut out));
        });
        group.bench_with_input(BenchmarkId::new("specialized", count), &count, |b, _| {
            b.iter(|| mix_specialized(black_box(&input), &mut out));
        });
    }
    group.finish();
}

fn bench_manager(c: &mut Criterion) {
    let mut group = c.benchmark_group("MixManager");
    for &count in ENTRY_COUNTS {
        let input = entries(count);
        let mut out = vec![0i16; FRAMES * 2];
        group.bench_with_input(BenchmarkId::new("add_and_flush", count), &count, |b, _| {
            let mut manager = MixManager::new();
            b.iter(|| {
                for entry in &input {
                    manager.add(entry).unwrap();
                }
                manager.mix_into(black_box(&mut out));
            });
        });
    }
    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tick");
    for &sources in &[1usize, 8, 32] {
        let engine = Engine::with_backends(
            EngineSettings {
                mix_frames: FRAMES,
                sync: true,
                devices: vec!["null".into()],
                ..EngineSettings::default()
            },
            vec![Arc::new(NullBackend::new()) as Arc<dyn Backend>],
        );
        let ctx = engine
            .create_context(&ContextAttributes::default())
            .unwrap();
        let buffer = engine.gen_buffers(1).unwrap()[0];
        let pcm: Vec<u8> = (0..FRAMES * 4)
            .flat_map(|i| ((i % 2000) as i16 - 1000).to_le_bytes())
            .collect();
        engine
            .buffer_data(buffer, Format::Mono16, &pcm, 44100)
            .unwrap();
        let ids = engine.gen_sources(sources).unwrap();
        for &id in &ids {
            engine
                .set_source(id, SourceParam::Buffer, ParamValue::Buffer(buffer))
                .unwrap();
            engine
                .set_source(id, SourceParam::Looping, ParamValue::Bool(true))
                .unwrap();
        }
        engine.play_sources(&ids).unwrap();

        group.bench_with_input(BenchmarkId::new("process", sources), &sources, |b, _| {
            b.iter(|| engine.process_context(black_box(ctx)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_summation, bench_manager, bench_tick);
criterion_main!(benches);
