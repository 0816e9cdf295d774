//! Prolly tree engine
//!
//! Prolly trees (probabilistic B-trees) combine properties of B-trees and Merkle trees:
//! - Content-defined chunk boundaries for structural sharing
//! - O(log n) seeks by index or by key
//! - Edits that rewrite only the chunks around the edit point
//! - Diffs that skip equal subtrees by hash

mod boundary;
mod chunker;
pub mod codec;
mod cursor;
mod diff;
mod sequence;

pub use boundary::BoundaryChecker;
pub use chunker::{ChunkStrategy, IndexedStrategy, OrderedStrategy, SequenceChunker};
pub use cursor::SequenceCursor;
pub use diff::{diff_indexed, diff_ordered, ChangeType, KeyValueChange, Splice};
pub use sequence::{
    ChildRef, LeafItems, LeafSequence, MetaSequence, MetaTuple, OrderKey, Sequence, SequenceItem,
};
