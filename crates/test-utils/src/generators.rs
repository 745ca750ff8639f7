//! Generators for synthetic flag-band pixel data.
//!
//! The patterns are predictable so tests can compute expected per-flag
//! counts without re-implementing the decoder.

/// Creates a flag grid where pixel `i` sets the mask `masks[i % masks.len()]`.
///
/// Every `stride`-th pixel (counting from 0) is left at `0` instead, so the
/// grid also contains pixels with no flag set. A `stride` of `0` disables this.
///
/// # Example
///
/// ```
/// use test_utils::create_flag_grid;
///
/// let grid = create_flag_grid(&[1, 2, 4], 6, 0);
/// assert_eq!(grid, vec![1, 2, 4, 1, 2, 4]);
///
/// let grid = create_flag_grid(&[1, 2], 4, 3);
/// assert_eq!(grid, vec![0, 2, 1, 0]);
/// ```
pub fn create_flag_grid(masks: &[i32], len: usize, stride: usize) -> Vec<i32> {
    (0..len)
        .map(|i| {
            if masks.is_empty() || (stride > 0 && i % stride == 0) {
                0
            } else {
                masks[i % masks.len()]
            }
        })
        .collect()
}

/// Expected per-mask counts for [`create_flag_grid`] with the same arguments.
pub fn expected_flag_counts(masks: &[i32], len: usize, stride: usize) -> Vec<u64> {
    let mut counts = vec![0u64; masks.len()];
    if masks.is_empty() {
        return counts;
    }
    for i in 0..len {
        if stride > 0 && i % stride == 0 {
            continue;
        }
        counts[i % masks.len()] += 1;
    }
    counts
}

/// Combines the given masks into one pixel value.
pub fn combine_masks(masks: &[i32]) -> i32 {
    masks.iter().fold(0, |acc, m| acc | m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_counts_match_grid() {
        let masks = [1, 2, 4, i32::MIN];
        let grid = create_flag_grid(&masks, 100, 7);
        let counts = expected_flag_counts(&masks, 100, 7);
        for (mask, expected) in masks.iter().zip(&counts) {
            let actual = grid.iter().filter(|&&v| v == *mask).count() as u64;
            assert_eq!(actual, *expected);
        }
        assert_eq!(counts.iter().sum::<u64>(), 100 - 15);
    }

    #[test]
    fn test_combine_masks() {
        assert_eq!(combine_masks(&[1, 2]), 3);
        assert_eq!(combine_masks(&[i32::MIN, 1]), i32::MIN | 1);
        assert_eq!(combine_masks(&[]), 0);
    }
}
