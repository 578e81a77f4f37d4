//! Commit compilation and sync micro-benchmark.
//!
//! Measures:
//! - Compiling a full 2047-event sequence
//! - Compiling a sparse sequence that needs continuation entries
//! - Writing and verifying a full sequence into a simulated RAM

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use evg_common::consts::{MAX_DATA_ENTRIES, RAM_ENTRIES};
use evg_seq::backends::simulation::SimSeqRam;
use evg_seq::compiler::{CompileLimits, WorkingSequence, compile};
use evg_seq::hw_slot::HardwareSlot;

const LIMITS: CompileLimits = CompileLimits {
    capacity: RAM_ENTRIES,
    post_gap: 125,
};

fn full_ram() -> (Vec<u64>, Vec<u8>, Vec<u8>) {
    let timestamps = (1..=MAX_DATA_ENTRIES as u64).map(|i| i * 100).collect();
    let codes = (0..MAX_DATA_ENTRIES).map(|i| (i % 0x7E) as u8 + 1).collect();
    let masks = vec![0; MAX_DATA_ENTRIES];
    (timestamps, codes, masks)
}

fn bench_compile_full(c: &mut Criterion) {
    let (timestamps, codes, masks) = full_ram();

    c.bench_function("compile_full_ram", |b| {
        b.iter(|| {
            compile(
                WorkingSequence {
                    timestamps: black_box(&timestamps),
                    event_codes: &codes,
                    masks: &masks,
                },
                LIMITS,
            )
        });
    });
}

fn bench_compile_sparse(c: &mut Criterion) {
    // Every gap spans three register widths.
    let step = 3 * u64::from(u32::MAX) + 7;
    let timestamps: Vec<u64> = (1..=256u64).map(|i| i * step).collect();
    let codes = vec![1u8; timestamps.len()];

    c.bench_function("compile_sparse_continuations", |b| {
        b.iter(|| {
            compile(
                WorkingSequence {
                    timestamps: black_box(&timestamps),
                    event_codes: &codes,
                    masks: &[],
                },
                LIMITS,
            )
        });
    });
}

fn bench_write_and_verify(c: &mut Criterion) {
    let (timestamps, codes, masks) = full_ram();
    let entries = compile(
        WorkingSequence {
            timestamps: &timestamps,
            event_codes: &codes,
            masks: &masks,
        },
        LIMITS,
    )
    .unwrap();

    c.bench_function("write_and_verify_full_ram", |b| {
        b.iter_batched(
            || HardwareSlot::new(0, Box::new(SimSeqRam::new(RAM_ENTRIES))),
            |slot| {
                slot.write_entries(&entries);
                slot.verify_entries(&entries)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_compile_full,
    bench_compile_sparse,
    bench_write_and_verify
);
criterion_main!(benches);
