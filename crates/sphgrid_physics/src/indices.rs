use rayon::prelude::*;
use sphgrid_core::{GridKey, GridRange};

/// Fill `ranges` with the `[start, end)` slice of `sorted` owned by each cell.
///
/// Boundaries are detected in parallel; each run of equal cells then writes
/// its range once.
pub fn build_grid_indices(sorted: &[GridKey], ranges: &mut [GridRange]) {
    ranges
        .par_iter_mut()
        .for_each(|r| *r = GridRange::default());

    let n = sorted.len();
    let starts: Vec<usize> = (0..n)
        .into_par_iter()
        .filter(|&i| i == 0 || sorted[i].cell != sorted[i - 1].cell)
        .collect();

    for (run, &start) in starts.iter().enumerate() {
        let end = starts.get(run + 1).copied().unwrap_or(n);
        if let Some(range) = ranges.get_mut(sorted[start].cell as usize) {
            *range = GridRange {
                start: start as u32,
                end: end as u32,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_for_small_array() {
        let sorted = [
            GridKey::new(1, 4),
            GridKey::new(1, 0),
            GridKey::new(3, 2),
            GridKey::new(6, 1),
            GridKey::new(6, 3),
            GridKey::new(6, 5),
        ];
        let mut ranges = vec![GridRange { start: 9, end: 9 }; 8];
        build_grid_indices(&sorted, &mut ranges);

        assert_eq!(ranges[1], GridRange { start: 0, end: 2 });
        assert_eq!(ranges[3], GridRange { start: 2, end: 3 });
        assert_eq!(ranges[6], GridRange { start: 3, end: 6 });
        for empty in [0, 2, 4, 5, 7] {
            assert!(ranges[empty].is_empty());
        }
    }

    #[test]
    fn test_single_cell() {
        let sorted: Vec<GridKey> = (0..10).map(|i| GridKey::new(2, i)).collect();
        let mut ranges = vec![GridRange::default(); 3];
        build_grid_indices(&sorted, &mut ranges);
        assert_eq!(ranges[2], GridRange { start: 0, end: 10 });
        assert_eq!(ranges.iter().map(|r| r.len()).sum::<u32>(), 10);
    }
}
