/*
 * Row partitioning.
 *
 * Splits the grid height into one contiguous strip per live worker. The
 * first `height % workers` strips get one extra row, so strips never
 * overlap, never leave a gap, and always sum to the grid height.
 */

use gol_common::RowRange;

/// One worker's share of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Index into the list of live workers the split was made for
    pub worker_index: usize,
    /// Rows assigned to that worker
    pub rows: RowRange,
}

/// Splits `height` rows across `workers` workers.
///
/// Returns exactly `workers` partitions in worker order. When there are more
/// workers than rows, the trailing partitions are empty and must not be
/// dispatched.
pub fn split_rows(height: u32, workers: usize) -> Vec<Partition> {
    if workers == 0 {
        return Vec::new();
    }

    let n = workers as u32;
    let base = height / n;
    let extra = height % n;

    let mut offset = 0;
    (0..workers)
        .map(|i| {
            let rows = base + u32::from((i as u32) < extra);
            let partition = Partition {
                worker_index: i,
                rows: RowRange::new(offset, rows),
            };
            offset += rows;
            partition
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(parts: &[Partition], height: u32) {
        let mut next = 0;
        for p in parts {
            assert_eq!(p.rows.offset, next, "gap or overlap at {:?}", p);
            next = p.rows.end();
        }
        assert_eq!(next, height);
    }

    #[test]
    fn test_even_split() {
        let parts = split_rows(16, 4);
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|p| p.rows.height == 4));
        assert_covers(&parts, 16);
    }

    #[test]
    fn test_remainder_goes_to_first_partitions() {
        let parts = split_rows(10, 4);
        let heights: Vec<u32> = parts.iter().map(|p| p.rows.height).collect();
        assert_eq!(heights, vec![3, 3, 2, 2]);
        assert_covers(&parts, 10);
    }

    #[test]
    fn test_more_workers_than_rows() {
        let parts = split_rows(2, 5);
        let heights: Vec<u32> = parts.iter().map(|p| p.rows.height).collect();
        assert_eq!(heights, vec![1, 1, 0, 0, 0]);
        assert_covers(&parts, 2);
    }

    #[test]
    fn test_every_split_covers_the_grid() {
        for height in 1..40 {
            for workers in 1..9 {
                assert_covers(&split_rows(height, workers), height);
            }
        }
    }

    #[test]
    fn test_no_workers() {
        assert!(split_rows(8, 0).is_empty());
    }
}
