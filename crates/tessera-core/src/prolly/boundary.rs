//! Rolling-hash boundary checker
//!
//! A buzhash over 64-bit item fingerprints. The hash depends only on the last
//! `window` fingerprints, so the same run of items cuts identically wherever it
//! appears in a sequence.
//!
//! Periodic input makes any rolling hash periodic, so on its own it would cut
//! such runs into single items or never cut them at all. Chunks are therefore
//! also bounded by length: a hash match closes a chunk only once it holds a
//! quarter of the target size, and a chunk reaching eight times the target is
//! closed regardless. Both bounds count from the chunk start, which is itself a
//! boundary, so decisions stay a function of content.

use super::sequence::SequenceItem;
use crate::config::ChunkConfig;
use crate::value::SequenceKind;
use std::collections::VecDeque;

/// Hash matches are ignored in chunks shorter than `target / MIN_CHUNK_DIVISOR`
pub const MIN_CHUNK_DIVISOR: usize = 4;

/// Chunks are cut unconditionally at `target * MAX_CHUNK_FACTOR` items
pub const MAX_CHUNK_FACTOR: usize = 8;

const fn byte_fingerprints() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        table[i] = z;
        i += 1;
    }
    table
}

/// Fingerprints of single blob bytes
static BYTE_FINGERPRINTS: [u64; 256] = byte_fingerprints();

impl SequenceItem {
    /// 64-bit rolling-hash input for this item
    ///
    /// Values and map entries use their fingerprint digest (the full entry for
    /// maps), meta tuples their child hash, and bytes a fixed table.
    pub fn fingerprint(&self) -> u64 {
        match self {
            SequenceItem::Value(v) => v.hash().prefix_u64(),
            SequenceItem::Entry(e) => e.hash().prefix_u64(),
            SequenceItem::Byte(b) => BYTE_FINGERPRINTS[*b as usize],
            SequenceItem::Tuple(t) => t.hash().prefix_u64(),
        }
    }
}

/// Decides where chunks end
#[derive(Clone, Debug)]
pub struct BoundaryChecker {
    window: usize,
    pattern: u64,
    min_chunk: usize,
    max_chunk: usize,
    hash: u64,
    fingerprints: VecDeque<u64>,
}

impl BoundaryChecker {
    /// Create a checker targeting chunks of `2^pattern_bits` items
    pub fn new(window: usize, pattern_bits: u32) -> Self {
        let window = window.max(1);
        let bits = pattern_bits.clamp(1, 31);
        let target = 1usize << bits;
        Self {
            window,
            pattern: (1u64 << bits) - 1,
            min_chunk: (target / MIN_CHUNK_DIVISOR).max(1),
            max_chunk: target.saturating_mul(MAX_CHUNK_FACTOR),
            hash: 0,
            fingerprints: VecDeque::with_capacity(window + 1),
        }
    }

    /// The checker for one level of a collection kind
    pub fn for_level(kind: SequenceKind, level: usize, config: &ChunkConfig) -> Self {
        let (window, bits) = config.boundary_params(kind, level);
        Self::new(window, bits)
    }

    /// Items that must be seen before the checker's state is fully determined
    pub fn window_size(&self) -> usize {
        self.window
    }

    /// Shortest chunk a hash match may close
    pub fn min_chunk(&self) -> usize {
        self.min_chunk
    }

    /// Longest chunk ever emitted
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Feed an item; true if the rolling hash matches after it
    pub fn write(&mut self, item: &SequenceItem) -> bool {
        self.write_fingerprint(item.fingerprint())
    }

    /// Feed the item that makes the open chunk `chunk_len` items long; true if
    /// the chunk should end after it
    pub fn write_in_chunk(&mut self, item: &SequenceItem, chunk_len: usize) -> bool {
        let matched = self.write(item);
        chunk_len >= self.max_chunk || (matched && chunk_len >= self.min_chunk)
    }

    /// Feed a raw fingerprint; true if the rolling hash matches after it
    pub fn write_fingerprint(&mut self, fingerprint: u64) -> bool {
        self.hash = self.hash.rotate_left(1) ^ fingerprint;
        self.fingerprints.push_back(fingerprint);
        if self.fingerprints.len() > self.window {
            if let Some(out) = self.fingerprints.pop_front() {
                self.hash ^= out.rotate_left((self.window % 64) as u32);
            }
        }
        self.hash & self.pattern == self.pattern
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.hash = 0;
        self.fingerprints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use proptest::prelude::*;

    fn decisions(checker: &mut BoundaryChecker, fps: &[u64]) -> Vec<bool> {
        fps.iter().map(|&fp| checker.write_fingerprint(fp)).collect()
    }

    #[test]
    fn test_hash_equals_window_only() {
        let mut long = BoundaryChecker::new(4, 8);
        let mut short = BoundaryChecker::new(4, 8);

        decisions(&mut long, &[9, 8, 7, 6, 5, 1, 2, 3, 4]);
        decisions(&mut short, &[1, 2, 3, 4]);

        assert_eq!(long.hash, short.hash);
    }

    #[test]
    fn test_boundary_rate_roughly_matches_pattern() {
        let mut checker = BoundaryChecker::new(64, 4);
        let boundaries = (0..4000)
            .filter(|i| checker.write(&SequenceItem::Value(Value::Int(*i))))
            .count();

        // Expect about 4000 / 16 = 250
        assert!(boundaries > 150 && boundaries < 350, "got {boundaries}");
    }

    #[test]
    fn test_byte_table_is_spread() {
        let mut sorted = BYTE_FINGERPRINTS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 256);
    }

    #[test]
    fn test_level_parameters() {
        let config = ChunkConfig::default();
        let blob = BoundaryChecker::for_level(SequenceKind::Blob, 0, &config);
        assert_eq!(blob.window_size(), 64);
        assert_eq!(blob.min_chunk(), 1024);
        assert_eq!(blob.max_chunk(), 32 * 1024);

        let small = ChunkConfig::small();
        let list = BoundaryChecker::for_level(SequenceKind::List, 0, &small);
        assert_eq!(list.window_size(), 4);
        assert_eq!(list.min_chunk(), 2);
        assert_eq!(list.max_chunk(), 64);
    }

    #[test]
    fn test_period_dividing_window_still_hashes() {
        // Equal fingerprints 32 items apart must not cancel out
        let mut checker = BoundaryChecker::new(64, 6);
        let period: Vec<u64> = (0..32u64).map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15)).collect();
        for _ in 0..4 {
            decisions(&mut checker, &period);
        }
        assert_ne!(checker.hash, 0);
    }

    #[rstest::rstest]
    #[case(0u8)]
    #[case(0xFF)]
    #[case(0x5A)]
    fn test_constant_run_cuts_within_bounds(#[case] byte: u8) {
        let mut checker = BoundaryChecker::new(64, 12);
        let item = SequenceItem::Byte(byte);
        let mut len = 0;
        let mut cuts = Vec::new();
        for _ in 0..200_000 {
            len += 1;
            if checker.write_in_chunk(&item, len) {
                cuts.push(len);
                len = 0;
            }
        }

        assert!(cuts.len() >= 200_000 / checker.max_chunk());
        assert!(cuts
            .iter()
            .all(|&n| n >= checker.min_chunk() && n <= checker.max_chunk()));
    }

    #[test]
    fn test_short_chunk_ignores_match() {
        let mut checker = BoundaryChecker::new(4, 4);
        let min = checker.min_chunk();
        assert_eq!(min, 4);

        let hit = (0..10_000).find_map(|i| {
            let item = SequenceItem::Value(Value::Int(i));
            let before = checker.clone();
            checker.write(&item).then_some((before, item))
        });
        let (before, item) = hit.expect("pattern of 4 bits matches within 10k items");

        assert!(!before.clone().write_in_chunk(&item, min - 1));
        assert!(before.clone().write_in_chunk(&item, min));
        assert!(before.clone().write_in_chunk(&item, before.max_chunk()));
    }

    proptest! {
        #[test]
        fn prop_decision_is_independent_of_offset(
            prefix_a in proptest::collection::vec(any::<u64>(), 0..50),
            prefix_b in proptest::collection::vec(any::<u64>(), 0..50),
            window in proptest::collection::vec(any::<u64>(), 8..40),
        ) {
            let mut a = BoundaryChecker::new(8, 3);
            let mut b = BoundaryChecker::new(8, 3);
            decisions(&mut a, &prefix_a);
            decisions(&mut b, &prefix_b);

            // Once a full window has been seen, decisions agree
            let da = decisions(&mut a, &window);
            let db = decisions(&mut b, &window);
            prop_assert_eq!(&da[7..], &db[7..]);
        }
    }
}
