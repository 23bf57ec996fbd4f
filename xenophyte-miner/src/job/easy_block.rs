//! Easy-block values and per-thread chunking.
//!
//! Easy blocks are a fixed set of up to 256 candidates spread evenly across
//! the job range. Workers pair them with each other before falling back to
//! random search, and random search never draws them again.

/// Maximum number of easy-block values for a job.
pub const EASY_BLOCK_COUNT: usize = 256;

// Above this range f32 can no longer represent every offset.
const MAX_FLOAT_PRECISION: i128 = 16_777_216;

/// Generate the easy-block values for `[min, max]`.
///
/// Small ranges (256 values or fewer) are enumerated completely. Larger
/// ranges are sampled at 256 evenly spaced fractions. The result is sorted
/// and free of duplicates.
pub fn generate(min: i64, max: i64) -> Vec<i64> {
    if max < min {
        return Vec::new();
    }

    let range = max as i128 - min as i128 + 1;

    if range <= EASY_BLOCK_COUNT as i128 {
        return (min..=max).collect();
    }

    let mut values: Vec<i64> = (0..EASY_BLOCK_COUNT)
        .map(|i| {
            let offset = if range <= MAX_FLOAT_PRECISION {
                let fraction = (i as f32 / 255.0f32 - 0.000_000_1f32).max(0.0);
                (fraction * range as f32) as i128
            } else {
                let fraction = (i as f64 / 255.0 - 0.000_000_000_01).max(0.0);
                (fraction * range as f64) as i128
            };
            (min as i128 + offset).min(max as i128) as i64
        })
        .collect();

    values.sort_unstable();
    values.dedup();
    values
}

/// Split `total` items into `chunks` contiguous chunks and return the
/// `(start, len)` of chunk `index`.
///
/// The first `total % chunks` chunks get one extra item. Chunks are disjoint
/// and together cover `0..total`.
pub fn job_chunk(total: usize, chunks: usize, index: usize) -> (usize, usize) {
    if chunks == 0 || index >= chunks {
        return (0, 0);
    }
    let quotient = total / chunks;
    let remainder = total % chunks;
    let start = index * quotient + index.min(remainder);
    let len = quotient + usize::from(index < remainder);
    (start, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(min: i64, max: i64) {
        let values = generate(min, max);
        assert!(!values.is_empty());
        assert!(values.len() <= EASY_BLOCK_COUNT);
        assert!(values.iter().all(|&v| v >= min && v <= max), "[{min}, {max}]");
        assert!(values.windows(2).all(|w| w[0] < w[1]), "duplicates in [{min}, {max}]");
    }

    #[test]
    fn test_small_range_is_enumerated() {
        assert_eq!(generate(2, 6), vec![2, 3, 4, 5, 6]);
        assert_eq!(generate(1, 256).len(), 256);
        assert_eq!(generate(7, 7), vec![7]);
    }

    #[test]
    fn test_large_range_has_256_values() {
        let values = generate(2, 10107);
        assert_eq!(values.len(), 256);
        assert_eq!(values[0], 2);
        assert!(*values.last().unwrap() >= 10100);
    }

    #[test]
    fn test_values_in_range_without_duplicates() {
        let ranges = [
            (2, 10107),
            (1, 257),
            (0, 300),
            (1, 16_777_215),
            (1, 16_777_216),
            (5, 16_777_300),
            (1, 4_000_000_000),
            (1_000_000, 9_007_199_254_740_992),
            (1, i64::MAX),
        ];
        for (min, max) in ranges {
            assert_valid(min, max);
        }
    }

    #[test]
    fn test_inverted_range_is_empty() {
        assert!(generate(10, 2).is_empty());
    }

    #[test]
    fn test_chunks_cover_every_index_once() {
        for total in [0usize, 1, 5, 255, 256, 1000] {
            for chunks in 1..=64 {
                let mut covered = vec![0u8; total];
                let mut next = 0;
                for index in 0..chunks {
                    let (start, len) = job_chunk(total, chunks, index);
                    assert_eq!(start, next, "gap at total={total} chunks={chunks}");
                    for slot in &mut covered[start..start + len] {
                        *slot += 1;
                    }
                    next = start + len;
                }
                assert_eq!(next, total);
                assert!(covered.iter().all(|&c| c == 1));
            }
        }
    }

    #[test]
    fn test_chunk_sizes_differ_by_at_most_one() {
        let sizes: Vec<usize> = (0..3).map(|i| job_chunk(256, 3, i).1).collect();
        assert_eq!(sizes, vec![86, 85, 85]);
    }

    #[test]
    fn test_chunk_with_no_chunks() {
        assert_eq!(job_chunk(256, 0, 0), (0, 0));
        assert_eq!(job_chunk(256, 2, 5), (0, 0));
    }
}
