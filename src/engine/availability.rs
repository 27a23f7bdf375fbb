use std::collections::BTreeSet;

use crate::limits::SLOTS_PER_DAY;
use crate::model::*;

// ── Availability Resolver ─────────────────────────────────────────

/// Start indices at which `required` contiguous slots fit.
///
/// A slot is allowed if at least one range in `allowed` covers it. Start `i`
/// is valid when every index of `[i, i + required)` is allowed and none is in
/// `occupied`. Candidates are scanned in ascending order over
/// `[min(allowed), max(allowed)]`, so the result is ascending.
pub fn compute_available_start_times(
    allowed: &[SlotRange],
    occupied: &BTreeSet<Slot>,
    required: u32,
) -> Vec<Slot> {
    if required == 0 {
        return Vec::new();
    }
    let merged = merge_ranges(allowed);
    let (Some(first), Some(last)) = (merged.first(), merged.last()) else {
        return Vec::new();
    };
    let (lo, hi) = (first.start, last.end);
    let required = required as Slot;

    let is_free = |slot: Slot| -> bool {
        merged.iter().any(|r| r.contains(slot)) && !occupied.contains(&slot)
    };

    // Sliding window: `run` counts consecutive free slots ending at `slot`.
    let mut starts = Vec::new();
    let mut run: Slot = 0;
    for slot in lo..hi {
        if is_free(slot) {
            run += 1;
        } else {
            run = 0;
        }
        if run >= required {
            starts.push(slot + 1 - required);
        }
    }
    starts
}

/// Merge overlapping or adjacent ranges into disjoint ranges, sorted by start.
pub fn merge_ranges(ranges: &[SlotRange]) -> Vec<SlotRange> {
    let mut sorted: Vec<SlotRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort_by_key(|r| r.start);

    let mut merged: Vec<SlotRange> = Vec::new();
    for range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Every slot index covered by an occupied row.
pub fn occupied_indices(slots: &[TimeSlot]) -> BTreeSet<Slot> {
    slots
        .iter()
        .filter(|s| s.is_occupied)
        .flat_map(|s| s.span().indices())
        .collect()
}

/// The working window of a date, clipped to one day. Empty when the date is
/// not available.
pub fn allowed_ranges(date: &DateAvailability) -> Vec<SlotRange> {
    if !date.is_available {
        return Vec::new();
    }
    let start = date.slot_start.max(0);
    let end = date.slot_end.min(SLOTS_PER_DAY);
    if start >= end {
        return Vec::new();
    }
    vec![SlotRange::new(start, end)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn ranges(pairs: &[(Slot, Slot)]) -> Vec<SlotRange> {
        pairs.iter().map(|&(s, e)| SlotRange::new(s, e)).collect()
    }

    fn set(slots: &[Slot]) -> BTreeSet<Slot> {
        slots.iter().copied().collect()
    }

    #[test]
    fn free_window_yields_every_fitting_start() {
        let starts = compute_available_start_times(&ranges(&[(0, 10)]), &set(&[]), 3);
        assert_eq!(starts, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn occupied_pair_excludes_overlapping_starts() {
        let starts = compute_available_start_times(&ranges(&[(0, 10)]), &set(&[4, 5]), 2);
        assert_eq!(starts, vec![0, 1, 2, 6, 7, 8]);
    }

    #[test]
    fn empty_ranges_yield_nothing() {
        assert!(compute_available_start_times(&[], &set(&[]), 1).is_empty());
    }

    #[test]
    fn zero_required_yields_nothing() {
        assert!(compute_available_start_times(&ranges(&[(0, 10)]), &set(&[]), 0).is_empty());
    }

    #[test]
    fn required_longer_than_any_range_yields_nothing() {
        let starts = compute_available_start_times(&ranges(&[(0, 4), (10, 13)]), &set(&[]), 5);
        assert!(starts.is_empty());
    }

    #[test]
    fn gap_between_ranges_is_not_bridged() {
        let starts = compute_available_start_times(&ranges(&[(0, 3), (5, 8)]), &set(&[]), 2);
        assert_eq!(starts, vec![0, 1, 5, 6]);
    }

    #[test]
    fn adjacent_ranges_join() {
        let starts = compute_available_start_times(&ranges(&[(0, 3), (3, 6)]), &set(&[]), 4);
        assert_eq!(starts, vec![0, 1, 2]);
    }

    #[test]
    fn unsorted_overlapping_ranges() {
        let starts = compute_available_start_times(&ranges(&[(6, 9), (0, 4), (3, 7)]), &set(&[]), 9);
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn occupancy_outside_allowed_is_irrelevant() {
        let starts = compute_available_start_times(&ranges(&[(10, 14)]), &set(&[0, 1, 20]), 2);
        assert_eq!(starts, vec![10, 11, 12]);
    }

    #[test]
    fn every_start_fits_allowed_and_free() {
        let allowed = ranges(&[(100, 130), (140, 170), (165, 190)]);
        let occupied = set(&[105, 106, 107, 150, 151, 175]);
        for required in 1..=12u32 {
            let starts = compute_available_start_times(&allowed, &occupied, required);
            assert!(starts.windows(2).all(|w| w[0] < w[1]), "ascending");
            for &i in &starts {
                for slot in i..i + required as Slot {
                    assert!(allowed.iter().any(|r| r.contains(slot)), "{slot} not allowed");
                    assert!(!occupied.contains(&slot), "{slot} occupied");
                }
            }
        }
    }

    #[test]
    fn identical_inputs_identical_output() {
        let allowed = ranges(&[(108, 216)]);
        let occupied = set(&[120, 121, 122, 123, 124, 125]);
        let a = compute_available_start_times(&allowed, &occupied, 6);
        let b = compute_available_start_times(&allowed, &occupied, 6);
        assert_eq!(a, b);
    }

    // ── merge_ranges ─────────────────────────────────────

    #[test]
    fn merge_drops_empty_and_sorts() {
        let merged = merge_ranges(&ranges(&[(20, 30), (5, 5), (0, 10), (8, 12)]));
        assert_eq!(merged, ranges(&[(0, 12), (20, 30)]));
    }

    // ── occupancy / window helpers ───────────────────────

    fn time_slot(start: Slot, size: Slot, occupied: bool) -> TimeSlot {
        TimeSlot {
            id: Ulid::new(),
            barber_id: Ulid::new(),
            date_id: Ulid::new(),
            slot_start: start,
            slot_size: size,
            is_occupied: occupied,
        }
    }

    #[test]
    fn occupied_rows_expand_to_indices() {
        let rows = vec![time_slot(10, 3, true), time_slot(20, 2, false), time_slot(30, 1, true)];
        assert_eq!(occupied_indices(&rows), set(&[10, 11, 12, 30]));
    }

    fn date(start: Slot, end: Slot, available: bool) -> DateAvailability {
        DateAvailability {
            id: Ulid::new(),
            barber_id: Ulid::new(),
            date: chrono::NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            slot_start: start,
            slot_end: end,
            is_available: available,
        }
    }

    #[test]
    fn window_clipped_to_day() {
        assert_eq!(allowed_ranges(&date(108, 216, true)), ranges(&[(108, 216)]));
        assert_eq!(allowed_ranges(&date(-4, 400, true)), ranges(&[(0, SLOTS_PER_DAY)]));
        assert!(allowed_ranges(&date(108, 216, false)).is_empty());
        assert!(allowed_ranges(&date(216, 108, true)).is_empty());
    }
}
