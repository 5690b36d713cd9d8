//! Shard partitioning. Two strategies, both reproducible without any
//! coordination between shards and both forming a disjoint union of the
//! input; they do not assign the same items to the same shard.

use std::ops::Range;

/// Contiguous near-equal ranges: shard `i` of `shard_count` gets
/// `len / shard_count` items plus one extra while `i < len % shard_count`.
/// Used for the forward pass over the work list.
pub fn contiguous_range(len: usize, shard_count: usize, shard_index: usize) -> Range<usize> {
    let shard_count = shard_count.max(1);
    let base = len / shard_count;
    let remainder = len % shard_count;
    let start = shard_index * base + shard_index.min(remainder);
    let extra = usize::from(shard_index < remainder);
    start..(start + base + extra).min(len)
}

/// Every `shard_count`-th item starting at `shard_index`. Used by the
/// reconciliation pass, whose input order carries no locality worth keeping.
pub fn interleaved<T: Clone>(items: &[T], shard_count: usize, shard_index: usize) -> Vec<T> {
    items
        .iter()
        .skip(shard_index)
        .step_by(shard_count.max(1))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_ranges_reconstruct_the_list_in_order() {
        for len in [0usize, 1, 2, 7, 10, 23, 100] {
            for shard_count in [1usize, 2, 3, 5, 8, 13] {
                let items: Vec<usize> = (0..len).collect();
                let mut rebuilt = Vec::new();
                let mut previous_end = 0;
                for shard_index in 0..shard_count {
                    let range = contiguous_range(len, shard_count, shard_index);
                    assert_eq!(
                        range.start, previous_end,
                        "ranges must tile without gaps (len={len}, shards={shard_count})"
                    );
                    previous_end = range.end;
                    rebuilt.extend_from_slice(&items[range]);
                }
                assert_eq!(rebuilt, items);
            }
        }
    }

    #[test]
    fn contiguous_load_is_near_equal() {
        for shard_index in 0..4 {
            let range = contiguous_range(10, 4, shard_index);
            let size = range.end - range.start;
            assert!((2..=3).contains(&size));
        }
    }

    #[test]
    fn interleaved_shards_form_a_disjoint_union() {
        let items: Vec<usize> = (0..23).collect();
        for shard_count in [1usize, 2, 4, 7] {
            let mut combined: Vec<usize> = (0..shard_count)
                .flat_map(|shard_index| interleaved(&items, shard_count, shard_index))
                .collect();
            combined.sort_unstable();
            assert_eq!(combined, items);
        }
    }

    #[test]
    fn empty_input_assigns_nothing() {
        assert!(contiguous_range(0, 4, 2).is_empty());
        assert!(interleaved::<usize>(&[], 4, 2).is_empty());
    }

    #[test]
    fn single_shard_gets_everything() {
        let items: Vec<usize> = (0..5).collect();
        assert_eq!(contiguous_range(5, 1, 0), 0..5);
        assert_eq!(interleaved(&items, 1, 0), items);
    }
}
