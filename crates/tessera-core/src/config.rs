//! Chunking and store configuration

use crate::value::SequenceKind;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Default rolling-hash window for list, set and map leaves
pub const DEFAULT_ITEM_WINDOW: usize = 64;

/// Default pattern bits for leaves (average chunk of 64 items)
pub const DEFAULT_ITEM_PATTERN_BITS: u32 = 6;

/// Default rolling-hash window for meta sequences
pub const DEFAULT_META_WINDOW: usize = 64;

/// Default pattern bits for meta sequences (average fan-out of 64)
pub const DEFAULT_META_PATTERN_BITS: u32 = 6;

/// Default rolling-hash window for blob leaves, in bytes
pub const DEFAULT_BYTE_WINDOW: usize = 64;

/// Default pattern bits for blob leaves (average chunk of 4 KiB)
pub const DEFAULT_BYTE_PATTERN_BITS: u32 = 12;

/// Default bound on concurrent chunk reads and writes
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default number of decoded chunks kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Configuration for chunk boundaries and store access
///
/// All collections written through one store share a configuration; changing
/// any window or pattern changes every chunk hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Rolling window over list, set and map leaf items
    pub item_window: usize,
    /// Boundary pattern bits for leaf items
    pub item_pattern_bits: u32,
    /// Rolling window over meta tuples
    pub meta_window: usize,
    /// Boundary pattern bits for meta tuples
    pub meta_pattern_bits: u32,
    /// Rolling window over blob bytes
    pub byte_window: usize,
    /// Boundary pattern bits for blob bytes
    pub byte_pattern_bits: u32,
    /// Maximum concurrent chunk fetches
    pub read_concurrency: usize,
    /// Maximum concurrent chunk writes
    pub write_concurrency: usize,
    /// Decoded chunks held in the LRU cache
    pub cache_capacity: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            item_window: DEFAULT_ITEM_WINDOW,
            item_pattern_bits: DEFAULT_ITEM_PATTERN_BITS,
            meta_window: DEFAULT_META_WINDOW,
            meta_pattern_bits: DEFAULT_META_PATTERN_BITS,
            byte_window: DEFAULT_BYTE_WINDOW,
            byte_pattern_bits: DEFAULT_BYTE_PATTERN_BITS,
            read_concurrency: DEFAULT_CONCURRENCY,
            write_concurrency: DEFAULT_CONCURRENCY,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ChunkConfig {
    /// Tiny chunks, so that small test inputs still build multi-level trees
    pub fn small() -> Self {
        Self {
            item_window: 4,
            item_pattern_bits: 3,
            meta_window: 4,
            meta_pattern_bits: 2,
            byte_window: 16,
            byte_pattern_bits: 6,
            read_concurrency: 4,
            write_concurrency: 4,
            cache_capacity: 256,
        }
    }

    /// Window and pattern bits for one tree level of a collection kind
    pub fn boundary_params(&self, kind: SequenceKind, level: usize) -> (usize, u32) {
        if level > 0 {
            (self.meta_window, self.meta_pattern_bits)
        } else if kind == SequenceKind::Blob {
            (self.byte_window, self.byte_pattern_bits)
        } else {
            (self.item_window, self.item_pattern_bits)
        }
    }

    /// Reject configurations that cannot chunk
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("item_window", self.item_window),
            ("meta_window", self.meta_window),
            ("byte_window", self.byte_window),
            ("read_concurrency", self.read_concurrency),
            ("write_concurrency", self.write_concurrency),
            ("cache_capacity", self.cache_capacity),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(CoreError::Configuration(format!("{name} must be positive")));
            }
        }

        let bits = [
            ("item_pattern_bits", self.item_pattern_bits),
            ("meta_pattern_bits", self.meta_pattern_bits),
            ("byte_pattern_bits", self.byte_pattern_bits),
        ];
        for (name, value) in bits {
            if !(1..=31).contains(&value) {
                return Err(CoreError::Configuration(format!(
                    "{name} must be within 1..=31, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        ChunkConfig::default().validate().unwrap();
        ChunkConfig::small().validate().unwrap();
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = ChunkConfig {
            item_window: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Configuration(_))));
    }

    #[test]
    fn test_pattern_bits_range() {
        let config = ChunkConfig {
            byte_pattern_bits: 32,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_boundary_params_by_level() {
        let config = ChunkConfig::default();
        assert_eq!(config.boundary_params(SequenceKind::Blob, 0), (64, 12));
        assert_eq!(config.boundary_params(SequenceKind::Blob, 1), (64, 6));
        assert_eq!(config.boundary_params(SequenceKind::Map, 0), (64, 6));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ChunkConfig = serde_json::from_str(r#"{"item_pattern_bits": 4}"#).unwrap();
        assert_eq!(config.item_pattern_bits, 4);
        assert_eq!(config.item_window, DEFAULT_ITEM_WINDOW);
    }
}
