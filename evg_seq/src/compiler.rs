//! Commit compiler.
//!
//! Turns the user-editable working arrays of a sequence into the entries
//! written to Sequence RAM:
//!
//! 1. Absolute timestamps become per-entry deltas against the previous
//!    input timestamp (the first delta is the timestamp itself).
//! 2. Deltas wider than the 32-bit register are split with continuation
//!    entries `(0xFFFFFFFF, 0, 0)`.
//! 3. Compilation stops after a user-supplied EOS; otherwise an EOS is
//!    appended `post_gap` ticks after the last event.
//!
//! The compiler is pure: it never touches hardware or the definition it
//! compiles for, so a failure leaves the previous snapshot untouched.

use evg_common::consts::{CONTINUATION_DELTA, EOS_CODE};
use evg_common::seq::error::SequenceError;
use evg_common::seq::types::EventEntry;

/// Working arrays borrowed from a sequence definition.
#[derive(Debug, Clone, Copy)]
pub struct WorkingSequence<'a> {
    /// Absolute timestamps in ticks, strictly increasing.
    pub timestamps: &'a [u64],
    /// Event codes.
    pub event_codes: &'a [u8],
    /// Event masks; missing trailing masks read as 0.
    pub masks: &'a [u8],
}

/// Compiler limits taken from the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileLimits {
    /// Physical entries per RAM including the terminal entry.
    pub capacity: usize,
    /// Ticks between the last user event and the appended EOS.
    pub post_gap: u64,
}

/// Compile working arrays into Sequence RAM entries.
///
/// Iterates timestamps and event codes in lock-step up to the shorter of
/// the two, or through the first user EOS.
///
/// # Errors
/// - `SequenceError::NonMonotonic` on a duplicate or decreasing timestamp
/// - `SequenceError::TooManyEntries` if the result exceeds `limits.capacity`
pub fn compile(
    working: WorkingSequence<'_>,
    limits: CompileLimits,
) -> Result<Vec<EventEntry>, SequenceError> {
    let count = working.timestamps.len().min(working.event_codes.len());
    let mut entries = Vec::with_capacity(count + 1);
    let mut previous: Option<u64> = None;

    for index in 0..count {
        let timestamp = working.timestamps[index];
        let code = working.event_codes[index];
        let mask = working.masks.get(index).copied().unwrap_or(0);

        let delta = match previous {
            None => timestamp,
            Some(prev) if timestamp > prev => timestamp - prev,
            Some(prev) => {
                return Err(SequenceError::NonMonotonic {
                    index,
                    previous: prev,
                    current: timestamp,
                });
            }
        };

        push_split(&mut entries, delta, code, mask);
        previous = Some(timestamp);

        if code == EOS_CODE {
            break;
        }
    }

    match entries.last() {
        None => entries.push(EventEntry::eos(0)),
        Some(last) if last.is_eos() => {}
        Some(_) => push_split(&mut entries, limits.post_gap, EOS_CODE, 0),
    }

    if entries.len() > limits.capacity {
        return Err(SequenceError::TooManyEntries {
            len: entries.len(),
            capacity: limits.capacity,
        });
    }

    Ok(entries)
}

/// Push `(delta, code, mask)`, preceded by as many continuation entries as
/// needed to bring `delta` within the register width.
fn push_split(entries: &mut Vec<EventEntry>, mut delta: u64, code: u8, mask: u8) {
    let width = u64::from(CONTINUATION_DELTA);
    while delta > width {
        entries.push(EventEntry::CONTINUATION);
        delta -= width;
    }
    // Fits after the loop.
    entries.push(EventEntry::new(delta as u32, code, mask));
}

/// Reconstruct absolute timestamps of the real entries of a compiled
/// sequence, folding continuation entries into the following entry.
pub fn absolute_timestamps(entries: &[EventEntry]) -> Vec<u64> {
    let mut out = Vec::with_capacity(entries.len());
    let mut now = 0u64;
    for entry in entries {
        now += u64::from(entry.delta);
        if !entry.is_continuation() {
            out.push(now);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use evg_common::consts::RAM_ENTRIES;
    use proptest::prelude::*;

    const LIMITS: CompileLimits = CompileLimits {
        capacity: RAM_ENTRIES,
        post_gap: 125,
    };

    fn run(timestamps: &[u64], codes: &[u8], masks: &[u8]) -> Result<Vec<EventEntry>, SequenceError> {
        compile(
            WorkingSequence {
                timestamps,
                event_codes: codes,
                masks,
            },
            LIMITS,
        )
    }

    #[test]
    fn test_empty_sequence_is_single_eos() {
        let entries = run(&[], &[], &[]).unwrap();
        assert_eq!(entries, vec![EventEntry::new(0, 0x7F, 0)]);
    }

    #[test]
    fn test_single_event_gets_eos_after_gap() {
        let entries = run(&[100], &[7], &[3]).unwrap();
        assert_eq!(
            entries,
            vec![EventEntry::new(100, 7, 3), EventEntry::new(125, 0x7F, 0)]
        );
    }

    #[test]
    fn test_deltas_are_relative_to_previous_input() {
        let entries = run(&[10, 25, 40], &[1, 2, 3], &[]).unwrap();
        let deltas: Vec<u32> = entries.iter().map(|e| e.delta).collect();
        assert_eq!(deltas, vec![10, 15, 15, 125]);
    }

    #[test]
    fn test_missing_masks_default_to_zero() {
        let entries = run(&[1, 2], &[5, 6], &[9]).unwrap();
        assert_eq!(entries[0].mask, 9);
        assert_eq!(entries[1].mask, 0);
    }

    #[test]
    fn test_wide_delta_inserts_one_continuation() {
        // 0x1_0000_0020 - 20 = 0x1_0000_000C, one register width too wide.
        let entries = run(&[10, 20, 0x1_0000_0020], &[1, 2, 3], &[]).unwrap();
        assert_eq!(
            entries,
            vec![
                EventEntry::new(10, 1, 0),
                EventEntry::new(10, 2, 0),
                EventEntry::CONTINUATION,
                EventEntry::new(0xD, 3, 0),
                EventEntry::eos(125),
            ]
        );
        assert_eq!(entries.iter().filter(|e| e.is_continuation()).count(), 1);
    }

    #[test]
    fn test_delta_just_under_register_width_needs_no_continuation() {
        let entries = run(&[10, 20, 0x1_0000_0005], &[1, 2, 3], &[]).unwrap();
        assert!(entries.iter().all(|e| !e.is_continuation()));
        assert_eq!(entries[2].delta, 0xFFFF_FFF1);
    }

    #[test]
    fn test_multiple_register_widths() {
        let width = u64::from(u32::MAX);
        let entries = run(&[3 * width + 4], &[9], &[]).unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries[..3].iter().all(EventEntry::is_continuation));
        assert_eq!(entries[3], EventEntry::new(4, 9, 0));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let err = run(&[5, 5], &[1, 2], &[]).unwrap_err();
        assert_eq!(
            err,
            SequenceError::NonMonotonic {
                index: 1,
                previous: 5,
                current: 5
            }
        );
    }

    #[test]
    fn test_decreasing_timestamp_rejected() {
        assert!(run(&[10, 20, 15], &[1, 2, 3], &[]).is_err());
    }

    #[test]
    fn test_user_eos_stops_compilation() {
        let entries = run(&[10, 20, 30], &[1, 0x7F, 2], &[]).unwrap();
        assert_eq!(
            entries,
            vec![EventEntry::new(10, 1, 0), EventEntry::new(10, 0x7F, 0)]
        );
    }

    #[test]
    fn test_entries_after_user_eos_are_not_validated() {
        let entries = run(&[10, 20, 5], &[1, 0x7F, 2], &[]).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_shortest_array_bounds_iteration() {
        let entries = run(&[10, 20, 30], &[1], &[]).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_capacity_counts_appended_eos() {
        let limits = CompileLimits {
            capacity: 3,
            post_gap: 1,
        };
        let ok = compile(
            WorkingSequence {
                timestamps: &[1, 2],
                event_codes: &[1, 2],
                masks: &[],
            },
            limits,
        );
        assert_eq!(ok.unwrap().len(), 3);

        let err = compile(
            WorkingSequence {
                timestamps: &[1, 2, 3],
                event_codes: &[1, 2, 3],
                masks: &[],
            },
            limits,
        )
        .unwrap_err();
        assert_eq!(err, SequenceError::TooManyEntries { len: 4, capacity: 3 });
    }

    #[test]
    fn test_full_ram_fits() {
        let timestamps: Vec<u64> = (1..=2047).collect();
        let codes = vec![1u8; 2047];
        let entries = run(&timestamps, &codes, &[]).unwrap();
        assert_eq!(entries.len(), RAM_ENTRIES);
        assert!(entries.last().unwrap().is_eos());
    }

    #[test]
    fn test_absolute_timestamps_fold_continuations() {
        let entries = run(&[10, 0x2_0000_0000], &[1, 2], &[]).unwrap();
        assert_eq!(absolute_timestamps(&entries), vec![10, 0x2_0000_0000, 0x2_0000_0000 + 125]);
    }

    proptest! {
        #[test]
        fn test_compiled_deltas_reconstruct_input(
            steps in proptest::collection::vec(1u64..=0x3_0000_0000, 0..64)
        ) {
            let mut timestamps = Vec::with_capacity(steps.len());
            let mut now = 0u64;
            for step in &steps {
                now += step;
                timestamps.push(now);
            }
            let codes = vec![1u8; timestamps.len()];
            let entries = run(&timestamps, &codes, &[]).unwrap();

            prop_assert!(entries.last().unwrap().is_eos());
            let absolute = absolute_timestamps(&entries);
            prop_assert_eq!(&absolute[..timestamps.len()], &timestamps[..]);
            for pair in absolute.windows(2) {
                prop_assert!(pair[1] > pair[0]);
            }
        }
    }
}
