//! # Tessera Core
//!
//! Persistent, content-addressed collections for the Tessera database.
//!
//! This crate provides:
//! - **Prolly Trees**: chunked sequences whose boundaries are chosen by a rolling hash
//! - **Collections**: immutable `List`, `Set`, `Map` and `Blob` façades
//! - **Value Store**: chunk encoding, caching and persistence over any `BlockStore`
//! - **Diff**: structural diffs that skip shared subtrees by hash
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       List   Set   Map   Blob           │
//! ├─────────────────────────────────────────┤
//! │   Cursor   │   Chunker   │   Diff       │
//! ├─────────────────────────────────────────┤
//! │   Leaf / Meta Sequences  +  Codec       │
//! ├─────────────────────────────────────────┤
//! │   ValueStore (cache, persist, GC)       │
//! ├─────────────────────────────────────────┤
//! │           BlockStore                    │
//! └─────────────────────────────────────────┘
//! ```

pub mod blob;
pub mod collection;
pub mod config;
pub mod error;
pub mod hash;
pub mod list;
pub mod map;
pub mod prolly;
pub mod set;
pub mod store;
pub mod value;
pub mod walk;

pub use blob::Blob;
pub use collection::{Collection, CollectionIter};
pub use config::ChunkConfig;
pub use error::{CoreError, Result};
pub use hash::Hash;
pub use list::List;
pub use map::Map;
pub use prolly::{ChangeType, KeyValueChange, Splice};
pub use set::Set;
pub use store::ValueStore;
pub use value::{CollectionType, MapEntry, SequenceKind, Value, ValueType};

/// Version of the chunk format
pub const STORAGE_VERSION: &str = "1.0.0";
