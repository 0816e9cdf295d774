//! Subcommand implementations
//!
//! Every command builds its collections in a fresh in-memory store configured
//! from [`CliConfig`], then renders a report as text or JSON.

use crate::config::CliConfig;
use anyhow::Context;
use clap::Subcommand;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_blockstore::MemoryBlockStore;
use tessera_core::prolly::Sequence;
use tessera_core::{walk, Blob, Collection, Hash, List, Splice, Value, ValueStore, ValueType};
use tracing::{debug, info};

type Store = Arc<ValueStore<MemoryBlockStore>>;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Chunk a file as a blob and print tree statistics
    Chunk {
        /// File to chunk
        file: PathBuf,
    },
    /// Chunk two files and report shared chunks and byte splices
    Compare {
        old: PathBuf,
        new: PathBuf,
    },
    /// Diff two text files line by line through chunked lists
    DiffLines {
        old: PathBuf,
        new: PathBuf,
    },
}

/// Statistics for one chunked blob
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub root: Hash,
    pub length: u64,
    pub chunks: usize,
    pub leaves: usize,
    pub height: u64,
    pub mean_leaf_size: f64,
}

/// Structural sharing between two blobs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareReport {
    pub old: ChunkReport,
    pub new: ChunkReport,
    /// Chunks of the new tree already present in the old one
    pub shared_chunks: usize,
    /// Chunks only the new tree references
    pub new_chunks: usize,
    pub splices: Vec<Splice>,
}

/// One line-level change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineSplice {
    #[serde(flatten)]
    pub splice: Splice,
    pub removed_lines: Vec<String>,
    pub added_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLinesReport {
    pub old_root: Hash,
    pub new_root: Hash,
    pub splices: Vec<LineSplice>,
}

/// Run a subcommand and render its report
pub async fn execute(command: &Command, config: &CliConfig, json: bool) -> anyhow::Result<String> {
    let store: Store = Arc::new(ValueStore::with_config(
        Arc::new(MemoryBlockStore::new()),
        config.chunking.clone(),
    )?);

    match command {
        Command::Chunk { file } => {
            let report = chunk(&store, &read(file).await?).await?;
            render(&report, json)
        }
        Command::Compare { old, new } => {
            let report = compare(&store, &read(old).await?, &read(new).await?).await?;
            render(&report, json)
        }
        Command::DiffLines { old, new } => {
            let old_text = String::from_utf8(read(old).await?)
                .with_context(|| format!("{} is not UTF-8", old.display()))?;
            let new_text = String::from_utf8(read(new).await?)
                .with_context(|| format!("{} is not UTF-8", new.display()))?;
            let report = diff_lines(&store, &old_text, &new_text).await?;
            render(&report, json)
        }
    }
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), bytes = data.len(), "read input");
    Ok(data)
}

fn render<T: Serialize + fmt::Display>(report: &T, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(report)?)
    } else {
        Ok(report.to_string())
    }
}

async fn stats(store: &Store, blob: &Blob<MemoryBlockStore>) -> anyhow::Result<ChunkReport> {
    let root: &Arc<Sequence> = blob.sequence();
    let chunks = walk::chunk_hashes(store, root).await?.len();
    let leaves = walk::leaf_sequences(store, root).await?.len();
    let length = blob.len();

    Ok(ChunkReport {
        root: blob.hash(),
        length,
        chunks,
        leaves,
        height: root.level() + 1,
        mean_leaf_size: if leaves == 0 { 0.0 } else { length as f64 / leaves as f64 },
    })
}

pub async fn chunk(store: &Store, data: &[u8]) -> anyhow::Result<ChunkReport> {
    let blob = Blob::from_bytes(Arc::clone(store), data).await?;
    let report = stats(store, &blob).await?;
    info!(root = %report.root, chunks = report.chunks, "chunked blob");
    Ok(report)
}

pub async fn compare(store: &Store, old: &[u8], new: &[u8]) -> anyhow::Result<CompareReport> {
    let old_blob = Blob::from_bytes(Arc::clone(store), old).await?;
    let new_blob = Blob::from_bytes(Arc::clone(store), new).await?;

    let old_chunks: HashSet<Hash> = old_blob.chunks().await?.into_iter().collect();
    let new_chunks = new_blob.chunks().await?;
    let shared = new_chunks.iter().filter(|h| old_chunks.contains(h)).count();

    Ok(CompareReport {
        old: stats(store, &old_blob).await?,
        new: stats(store, &new_blob).await?,
        shared_chunks: shared,
        new_chunks: new_chunks.len() - shared,
        splices: new_blob.diff(&old_blob).await?,
    })
}

pub async fn diff_lines(store: &Store, old: &str, new: &str) -> anyhow::Result<DiffLinesReport> {
    let old_lines: Vec<String> = old.lines().map(str::to_owned).collect();
    let new_lines: Vec<String> = new.lines().map(str::to_owned).collect();

    let old_list = lines_list(store, &old_lines).await?;
    let new_list = lines_list(store, &new_lines).await?;

    let splices = new_list
        .diff(&old_list)
        .await?
        .into_iter()
        .map(|splice| LineSplice {
            splice,
            removed_lines: slice(&old_lines, splice.at, splice.removed),
            added_lines: slice(&new_lines, splice.from, splice.added),
        })
        .collect();

    Ok(DiffLinesReport {
        old_root: old_list.hash(),
        new_root: new_list.hash(),
        splices,
    })
}

async fn lines_list(store: &Store, lines: &[String]) -> anyhow::Result<List<MemoryBlockStore>> {
    let values = lines.iter().map(|line| Value::from(line.as_str())).collect();
    Ok(List::from_typed_values(Arc::clone(store), ValueType::String, values).await?)
}

fn slice(lines: &[String], start: u64, count: u64) -> Vec<String> {
    lines
        .iter()
        .skip(start as usize)
        .take(count as usize)
        .cloned()
        .collect()
}

impl fmt::Display for ChunkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root:       {}", self.root)?;
        writeln!(f, "length:     {} bytes", self.length)?;
        writeln!(f, "chunks:     {}", self.chunks)?;
        writeln!(f, "leaves:     {}", self.leaves)?;
        writeln!(f, "height:     {}", self.height)?;
        write!(f, "mean leaf:  {:.1} bytes", self.mean_leaf_size)
    }
}

impl fmt::Display for CompareReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "old:    {} ({} bytes, {} chunks)", self.old.root, self.old.length, self.old.chunks)?;
        writeln!(f, "new:    {} ({} bytes, {} chunks)", self.new.root, self.new.length, self.new.chunks)?;
        writeln!(f, "shared: {}", self.shared_chunks)?;
        write!(f, "fresh:  {}", self.new_chunks)?;
        for s in &self.splices {
            write!(f, "\n@ {}: -{} +{} (from {})", s.at, s.removed, s.added, s.from)?;
        }
        Ok(())
    }
}

impl fmt::Display for DiffLinesReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.splices.is_empty() {
            return write!(f, "no changes");
        }
        let mut first = true;
        for change in &self.splices {
            if !first {
                writeln!(f)?;
            }
            first = false;
            let s = change.splice;
            write!(f, "@@ -{},{} +{},{} @@", s.at + 1, s.removed, s.from + 1, s.added)?;
            for line in &change.removed_lines {
                write!(f, "\n-{line}")?;
            }
            for line in &change.added_lines {
                write!(f, "\n+{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tessera_core::ChunkConfig;

    fn store() -> Store {
        Arc::new(ValueStore::with_config(Arc::new(MemoryBlockStore::new()), ChunkConfig::small()).unwrap())
    }

    fn small_config() -> CliConfig {
        CliConfig {
            chunking: ChunkConfig::small(),
            ..Default::default()
        }
    }

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chunk_reports_tree_statistics() {
        let report = chunk(&store(), &pseudo_random(4096, 1)).await.unwrap();

        assert_eq!(report.length, 4096);
        assert!(report.leaves > 1);
        assert!(report.height > 1);
        assert!(report.chunks > report.leaves);
        assert!((report.mean_leaf_size - 4096.0 / report.leaves as f64).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_chunk_empty_input() {
        let report = chunk(&store(), &[]).await.unwrap();
        assert_eq!(report.length, 0);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.height, 1);
        assert_eq!(report.mean_leaf_size, 0.0);
    }

    #[tokio::test]
    async fn test_compare_identical_shares_everything() {
        let data = pseudo_random(2048, 2);
        let report = compare(&store(), &data, &data).await.unwrap();

        assert_eq!(report.new_chunks, 0);
        assert_eq!(report.shared_chunks, report.new.chunks);
        assert!(report.splices.is_empty());
    }

    #[tokio::test]
    async fn test_compare_appended_tail() {
        let old = pseudo_random(2048, 3);
        let mut new = old.clone();
        new.extend_from_slice(&pseudo_random(64, 4));

        let report = compare(&store(), &old, &new).await.unwrap();
        assert!(report.shared_chunks > 0);
        assert!(report.new_chunks > 0);
        let added: u64 = report.splices.iter().map(|s| s.added).sum();
        let removed: u64 = report.splices.iter().map(|s| s.removed).sum();
        assert_eq!(added - removed, 64);
    }

    #[rstest]
    #[case("a\nb\nc\n", "a\nb\nc\n", 0)]
    #[case("a\nb\nc\n", "a\nB\nc\n", 1)]
    #[case("a\nb\nc\n", "a\nc\nd\n", 2)]
    #[case("", "x\ny\n", 1)]
    #[tokio::test]
    async fn test_diff_lines_splice_count(#[case] old: &str, #[case] new: &str, #[case] expected: usize) {
        let report = diff_lines(&store(), old, new).await.unwrap();
        assert_eq!(report.splices.len(), expected);
    }

    #[tokio::test]
    async fn test_diff_lines_carries_affected_lines() {
        let report = diff_lines(&store(), "one\ntwo\nthree\n", "one\n2\nthree\n").await.unwrap();

        assert_eq!(report.splices.len(), 1);
        let change = &report.splices[0];
        assert_eq!(change.splice, Splice { at: 1, removed: 1, added: 1, from: 1 });
        assert_eq!(change.removed_lines, vec!["two".to_string()]);
        assert_eq!(change.added_lines, vec!["2".to_string()]);
        assert_eq!(report.to_string(), "@@ -2,1 +2,1 @@\n-two\n+2");
    }

    #[tokio::test]
    async fn test_execute_json_output() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&pseudo_random(1000, 5)).unwrap();

        let command = Command::Chunk {
            file: file.path().to_path_buf(),
        };
        let output = execute(&command, &small_config(), true).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["length"], 1000);
        assert!(parsed["root"].is_string());
    }

    #[tokio::test]
    async fn test_execute_missing_file() {
        let command = Command::Chunk {
            file: PathBuf::from("/nonexistent/input.bin"),
        };
        let err = execute(&command, &small_config(), false).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn test_execute_rejects_non_utf8_lines() {
        let mut old = tempfile::NamedTempFile::new().unwrap();
        old.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        let new = tempfile::NamedTempFile::new().unwrap();

        let command = Command::DiffLines {
            old: old.path().to_path_buf(),
            new: new.path().to_path_buf(),
        };
        assert!(execute(&command, &small_config(), false).await.is_err());
    }
}
