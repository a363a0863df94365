//! Backfill window arithmetic.

/// Tile `[last_height + 1, now_height]` into inclusive windows of width
/// `step_size + 1` blocks, the final window truncated to `now_height`.
///
/// The union of windows covers the range exactly: no gaps, no overlaps.
pub fn backfill_windows(last_height: u64, now_height: u64, step_size: u64) -> Vec<(u64, u64)> {
    let mut windows = Vec::new();
    let mut from = last_height + 1;
    while from <= now_height {
        let to = from.saturating_add(step_size).min(now_height);
        windows.push((from, to));
        from = to + 1;
    }
    windows
}

/// Backfill is skipped when the live subscription's inclusive replay can
/// cover the gap on its own.
pub fn needs_backfill(last_height: u64, now_height: u64, step_size: u64) -> bool {
    now_height.saturating_sub(last_height) > step_size + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_tile_the_documented_example() {
        // last=100, now=100050, step=10000 → 10 windows, final truncated
        let windows = backfill_windows(100, 100_050, 10_000);
        assert_eq!(windows.len(), 10);
        assert_eq!(windows[0], (101, 10_101));
        assert_eq!(windows[1], (10_102, 20_102));
        assert_eq!(windows[8], (80_109, 90_109));
        // final window truncated to now_height
        assert_eq!(*windows.last().unwrap(), (90_110, 100_050));
    }

    #[test]
    fn windows_cover_exactly_no_gaps_no_overlaps() {
        for (last, now, step) in [(0u64, 35u64, 9u64), (100, 100_050, 10_000), (7, 8, 3)] {
            let windows = backfill_windows(last, now, step);
            let mut expected_from = last + 1;
            for &(from, to) in &windows {
                assert_eq!(from, expected_from, "gap or overlap at {from}");
                assert!(to >= from);
                assert!(to - from <= step, "window wider than step+1 blocks");
                expected_from = to + 1;
            }
            assert_eq!(expected_from, now + 1, "range not fully covered");
        }
    }

    #[test]
    fn empty_range_yields_no_windows() {
        assert!(backfill_windows(50, 50, 10).is_empty());
        assert!(backfill_windows(50, 49, 10).is_empty());
    }

    #[test]
    fn small_gap_skips_backfill() {
        // gap of exactly step+1 is still covered by the live replay
        assert!(!needs_backfill(100, 100 + 10_001, 10_000));
        assert!(needs_backfill(100, 100 + 10_002, 10_000));
        assert!(!needs_backfill(100, 100, 10_000));
    }
}
