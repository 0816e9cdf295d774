//! # Tessera CLI
//!
//! The `tessera` tool runs the chunking engine over local files:
//! - **chunk**: tree statistics for one file stored as a blob
//! - **compare**: chunks shared between two versions of a file, plus byte splices
//! - **diff-lines**: a line diff computed from two chunked lists of strings

pub mod commands;
pub mod config;

pub use commands::{execute, Command};
pub use config::CliConfig;
