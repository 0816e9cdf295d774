//! Structural diff of two sequences
//!
//! Both trees are walked top-down in lockstep. At each level the runs of tuples
//! are aligned by child hash; aligned (equal) subtrees are skipped without being
//! read, and only the misaligned spans are expanded one level further down.

use super::sequence::{MetaTuple, OrderKey, Sequence, SequenceItem};
use crate::store::ValueStore;
use crate::value::Value;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tessera_blockstore::BlockStore;
use tracing::trace;

/// Largest edit matrix aligned exactly; bigger spans become a single splice
const MAX_SPLICE_MATRIX: usize = 2_000_000;

/// Type of change in a keyed diff
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    /// Key was added
    Add,
    /// Key was removed
    Remove,
    /// Value was modified
    Modify,
}

/// A key-value change between two versions of a set or map
///
/// Set changes carry the element as both key and value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValueChange<K, V> {
    /// The key that changed
    pub key: K,
    /// Type of change
    pub change_type: ChangeType,
    /// Old value (for Remove and Modify)
    pub old_value: Option<V>,
    /// New value (for Add and Modify)
    pub new_value: Option<V>,
}

impl<K, V> KeyValueChange<K, V> {
    /// Create an add change
    pub fn add(key: K, value: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Add,
            old_value: None,
            new_value: Some(value),
        }
    }

    /// Create a remove change
    pub fn remove(key: K, value: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Remove,
            old_value: Some(value),
            new_value: None,
        }
    }

    /// Create a modify change
    pub fn modify(key: K, old: V, new: V) -> Self {
        Self {
            key,
            change_type: ChangeType::Modify,
            old_value: Some(old),
            new_value: Some(new),
        }
    }
}

/// One edit of an indexed sequence
///
/// Replaces `removed` items starting at `at` in the old sequence with the
/// `added` items starting at `from` in the new one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splice {
    pub at: u64,
    pub removed: u64,
    pub added: u64,
    pub from: u64,
}

/// A run of items or tuples at one tree height, possibly spanning many chunks
#[derive(Debug)]
enum Run {
    Tuples(Vec<MetaTuple>),
    Items(Vec<SequenceItem>),
}

impl Run {
    fn of(seq: &Sequence) -> Self {
        match seq {
            Sequence::Meta(meta) => Run::Tuples(meta.tuples().to_vec()),
            Sequence::Leaf(leaf) => Run::Items((0..leaf.len()).filter_map(|i| leaf.item(i)).collect()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Run::Tuples(t) => t.len(),
            Run::Items(i) => i.len(),
        }
    }

    fn tuples(&self, start: usize, count: usize) -> &[MetaTuple] {
        match self {
            Run::Tuples(t) => &t[start..start + count],
            Run::Items(_) => &[],
        }
    }

    fn into_items(self) -> Vec<SequenceItem> {
        match self {
            Run::Items(items) => items,
            Run::Tuples(_) => Vec::new(),
        }
    }

    /// Leaves under the elements `start..start + count`
    fn leaves(&self, start: usize, count: usize) -> u64 {
        match self {
            Run::Tuples(t) => t[start..start + count].iter().map(|t| t.num_leaves).sum(),
            Run::Items(_) => count as u64,
        }
    }

    fn same(&self, i: usize, other: &Run, j: usize) -> bool {
        match (self, other) {
            (Run::Tuples(a), Run::Tuples(b)) => a[i].hash() == b[j].hash(),
            (Run::Items(a), Run::Items(b)) => a[i] == b[j],
            _ => false,
        }
    }
}

/// Concatenate the children of `tuples`, which live at `height`
async fn expand<S: BlockStore>(
    store: &ValueStore<S>,
    tuples: &[MetaTuple],
    height: u64,
) -> Result<Run> {
    let children = store.read_children(tuples).await?;
    if height == 0 {
        Ok(Run::Items(children.iter().flat_map(|c| Run::of(c).into_items()).collect()))
    } else {
        Ok(Run::Tuples(
            children
                .iter()
                .filter_map(|c| c.as_meta())
                .flat_map(|m| m.tuples().iter().cloned())
                .collect(),
        ))
    }
}

/// Two aligned spans at the same height, with their absolute leaf offsets
struct Region {
    last: Run,
    current: Run,
    height: u64,
    last_offset: u64,
    current_offset: u64,
}

enum Work<T> {
    Emit(T),
    Region(Region),
}

/// Bring both roots to the same height by expanding the taller one
async fn root_region<S: BlockStore>(
    store: &ValueStore<S>,
    last: &Sequence,
    current: &Sequence,
) -> Result<Region> {
    let (mut last_run, mut last_height) = (Run::of(last), last.level());
    let (mut current_run, mut current_height) = (Run::of(current), current.level());

    while last_height > current_height {
        last_height -= 1;
        last_run = expand(store, last_run.tuples(0, last_run.len()), last_height).await?;
    }
    while current_height > last_height {
        current_height -= 1;
        current_run = expand(store, current_run.tuples(0, current_run.len()), current_height).await?;
    }

    Ok(Region {
        last: last_run,
        current: current_run,
        height: last_height,
        last_offset: 0,
        current_offset: 0,
    })
}

/// The region below one misaligned span of `region`
async fn descend<S: BlockStore>(
    store: &ValueStore<S>,
    region: &Region,
    span: &Splice,
) -> Result<Region> {
    let (at, removed) = (span.at as usize, span.removed as usize);
    let (from, added) = (span.from as usize, span.added as usize);
    let height = region.height - 1;

    Ok(Region {
        last: expand(store, region.last.tuples(at, removed), height).await?,
        current: expand(store, region.current.tuples(from, added), height).await?,
        height,
        last_offset: region.last_offset + region.last.leaves(0, at),
        current_offset: region.current_offset + region.current.leaves(0, from),
    })
}

/// Minimal edit script between two sequences of lengths `old_len` and `new_len`
///
/// Common prefix and suffix are trimmed first; the middle is aligned by
/// longest common subsequence when small enough, else reported whole.
fn calc_splices(old_len: usize, new_len: usize, same: impl Fn(usize, usize) -> bool) -> Vec<Splice> {
    let mut prefix = 0;
    while prefix < old_len && prefix < new_len && same(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old_len - prefix
        && suffix < new_len - prefix
        && same(old_len - 1 - suffix, new_len - 1 - suffix)
    {
        suffix += 1;
    }

    let m = old_len - prefix - suffix;
    let n = new_len - prefix - suffix;
    if m == 0 && n == 0 {
        return Vec::new();
    }
    let whole = Splice {
        at: prefix as u64,
        removed: m as u64,
        added: n as u64,
        from: prefix as u64,
    };
    if m == 0 || n == 0 || (m + 1).saturating_mul(n + 1) > MAX_SPLICE_MATRIX {
        return vec![whole];
    }

    // lcs[i][j] = length of the longest common subsequence of old[i..] and new[j..]
    let width = n + 1;
    let mut lcs = vec![0u32; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            lcs[i * width + j] = if same(prefix + i, prefix + j) {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut splices = Vec::new();
    let mut open: Option<Splice> = None;
    let (mut i, mut j) = (0, 0);
    while i < m || j < n {
        let matched = i < m && j < n && same(prefix + i, prefix + j);
        if matched {
            splices.extend(open.take());
            i += 1;
            j += 1;
            continue;
        }
        let splice = open.get_or_insert(Splice {
            at: (prefix + i) as u64,
            removed: 0,
            added: 0,
            from: (prefix + j) as u64,
        });
        if j == n || (i < m && lcs[(i + 1) * width + j] >= lcs[i * width + j + 1]) {
            splice.removed += 1;
            i += 1;
        } else {
            splice.added += 1;
            j += 1;
        }
    }
    splices.extend(open.take());
    splices
}

/// Index splices turning `last` into `current`, in ascending order
pub async fn diff_indexed<S: BlockStore>(
    store: &ValueStore<S>,
    last: &Arc<Sequence>,
    current: &Arc<Sequence>,
) -> Result<Vec<Splice>> {
    let mut out = Vec::new();
    if last.hash() == current.hash() {
        return Ok(out);
    }

    let mut stack = vec![Work::Region(root_region(store, last, current).await?)];
    while let Some(work) = stack.pop() {
        let region = match work {
            Work::Emit(splice) => {
                out.push(splice);
                continue;
            }
            Work::Region(region) => region,
        };

        let spans = calc_splices(region.last.len(), region.current.len(), |i, j| {
            region.last.same(i, &region.current, j)
        });
        trace!(height = region.height, spans = spans.len(), "aligned level");

        let mut next = Vec::with_capacity(spans.len());
        for span in spans {
            let (at, removed) = (span.at as usize, span.removed as usize);
            let (from, added) = (span.from as usize, span.added as usize);
            if region.height == 0 || removed == 0 || added == 0 {
                // Whole subtrees in or out: translate to leaf coordinates
                next.push(Work::Emit(Splice {
                    at: region.last_offset + region.last.leaves(0, at),
                    removed: region.last.leaves(at, removed),
                    added: region.current.leaves(from, added),
                    from: region.current_offset + region.current.leaves(0, from),
                }));
            } else {
                next.push(Work::Region(descend(store, &region, &span).await?));
            }
        }
        stack.extend(next.into_iter().rev());
    }

    Ok(out)
}

fn key_of(item: &SequenceItem) -> OrderKey {
    item.order_key().unwrap_or(OrderKey::Count(0))
}

fn key_value(item: SequenceItem) -> Option<(Value, Value)> {
    match item {
        SequenceItem::Value(v) => Some((v.clone(), v)),
        SequenceItem::Entry(e) => Some((e.key, e.value)),
        _ => None,
    }
}

/// Sorted merge of two leaf runs
fn merge_items(
    last: Vec<SequenceItem>,
    current: Vec<SequenceItem>,
    out: &mut Vec<KeyValueChange<Value, Value>>,
) {
    let mut last = last.into_iter().peekable();
    let mut current = current.into_iter().peekable();

    loop {
        let order = match (last.peek(), current.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => key_of(a).cmp(&key_of(b)),
        };
        match order {
            Ordering::Less => {
                if let Some((k, v)) = last.next().and_then(key_value) {
                    out.push(KeyValueChange::remove(k, v));
                }
            }
            Ordering::Greater => {
                if let Some((k, v)) = current.next().and_then(key_value) {
                    out.push(KeyValueChange::add(k, v));
                }
            }
            Ordering::Equal => {
                let old = last.next().and_then(key_value);
                let new = current.next().and_then(key_value);
                if let (Some((k, old)), Some((_, new))) = (old, new) {
                    if old != new {
                        out.push(KeyValueChange::modify(k, old, new));
                    }
                }
            }
        }
    }
}

/// Keyed changes turning `last` into `current`, in ascending key order
pub async fn diff_ordered<S: BlockStore>(
    store: &ValueStore<S>,
    last: &Arc<Sequence>,
    current: &Arc<Sequence>,
) -> Result<Vec<KeyValueChange<Value, Value>>> {
    let mut out = Vec::new();
    if last.hash() == current.hash() {
        return Ok(out);
    }

    let mut stack: Vec<Work<()>> = vec![Work::Region(root_region(store, last, current).await?)];
    while let Some(Work::Region(region)) = stack.pop() {
        if region.height == 0 {
            let spans = calc_splices(region.last.len(), region.current.len(), |i, j| {
                region.last.same(i, &region.current, j)
            });
            let (last_items, current_items) = (region.last.into_items(), region.current.into_items());
            for span in spans {
                let removed = &last_items[span.at as usize..(span.at + span.removed) as usize];
                let added = &current_items[span.from as usize..(span.from + span.added) as usize];
                merge_items(removed.to_vec(), added.to_vec(), &mut out);
            }
            continue;
        }

        let spans = calc_splices(region.last.len(), region.current.len(), |i, j| {
            region.last.same(i, &region.current, j)
        });
        let mut next = Vec::with_capacity(spans.len());
        for span in spans {
            next.push(Work::Region(descend(store, &region, &span).await?));
        }
        stack.extend(next.into_iter().rev());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;
    use crate::prolly::{IndexedStrategy, OrderedStrategy, SequenceChunker};
    use crate::value::{CollectionType, MapEntry, ValueType};
    use rstest::rstest;
    use tessera_blockstore::MemoryBlockStore;

    type Store = Arc<ValueStore<MemoryBlockStore>>;

    fn store() -> Store {
        Arc::new(ValueStore::with_config(Arc::new(MemoryBlockStore::new()), ChunkConfig::small()).unwrap())
    }

    async fn list(store: &Store, values: &[i64]) -> Arc<Sequence> {
        let strategy = IndexedStrategy::new(CollectionType::list(ValueType::Int));
        let mut chunker = SequenceChunker::new_empty(Arc::clone(store), strategy);
        for &v in values {
            chunker.append(SequenceItem::Value(Value::Int(v))).unwrap();
        }
        chunker.done().await.unwrap()
    }

    async fn map(store: &Store, entries: &[(i64, &str)]) -> Arc<Sequence> {
        let strategy = OrderedStrategy::new(CollectionType::map(ValueType::Int, ValueType::String));
        let mut chunker = SequenceChunker::new_empty(Arc::clone(store), strategy);
        for &(k, v) in entries {
            chunker.append(SequenceItem::Entry(MapEntry::new(k, v))).unwrap();
        }
        chunker.done().await.unwrap()
    }

    fn splice(at: u64, removed: u64, added: u64, from: u64) -> Splice {
        Splice { at, removed, added, from }
    }

    #[rstest]
    #[case(&[1, 2, 3], &[1, 2, 3], vec![])]
    #[case(&[1, 2, 3], &[1, 9, 3], vec![splice(1, 1, 1, 1)])]
    #[case(&[1, 2, 3], &[1, 2, 3, 4], vec![splice(3, 0, 1, 3)])]
    #[case(&[1, 2, 3], &[], vec![splice(0, 3, 0, 0)])]
    #[case(&[1, 2, 3, 4, 5], &[1, 7, 3, 4, 8], vec![splice(1, 1, 1, 1), splice(4, 1, 1, 4)])]
    fn test_calc_splices(#[case] old: &[i64], #[case] new: &[i64], #[case] expected: Vec<Splice>) {
        assert_eq!(calc_splices(old.len(), new.len(), |i, j| old[i] == new[j]), expected);
    }

    #[tokio::test]
    async fn test_identical_lists_have_no_diff() {
        let store = store();
        let a = list(&store, &(0..300).collect::<Vec<_>>()).await;
        let b = list(&store, &(0..300).collect::<Vec<_>>()).await;

        assert!(diff_indexed(&store, &a, &b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_replacement_in_large_list() {
        let store = store();
        let old: Vec<i64> = (0..2000).collect();
        let mut new = old.clone();
        new[1234] = -1;

        let a = list(&store, &old).await;
        let b = list(&store, &new).await;
        let splices = diff_indexed(&store, &a, &b).await.unwrap();

        assert_eq!(splices, vec![splice(1234, 1, 1, 1234)]);
    }

    #[tokio::test]
    async fn test_diff_against_different_height() {
        let store = store();
        let a = list(&store, &[1, 2, 3]).await;
        let old: Vec<i64> = (0..500).collect();
        let b = list(&store, &old).await;
        assert!(b.level() > a.level());

        let splices = diff_indexed(&store, &a, &b).await.unwrap();
        let added: u64 = splices.iter().map(|s| s.added).sum();
        let removed: u64 = splices.iter().map(|s| s.removed).sum();
        assert_eq!(added - removed, 497);
    }

    #[tokio::test]
    async fn test_appended_tail() {
        let store = store();
        let old: Vec<i64> = (0..800).collect();
        let new: Vec<i64> = (0..900).collect();

        let splices = diff_indexed(&store, &list(&store, &old).await, &list(&store, &new).await)
            .await
            .unwrap();
        assert_eq!(splices, vec![splice(800, 0, 100, 800)]);
    }

    #[tokio::test]
    async fn test_map_changes_in_key_order() {
        let store = store();
        let old: Vec<(i64, &str)> = (0..400).map(|k| (k, "v")).collect();
        let mut new = old.clone();
        new.remove(10);
        new[200].1 = "changed";
        new.push((1000, "new"));

        let changes = diff_ordered(&store, &map(&store, &old).await, &map(&store, &new).await)
            .await
            .unwrap();

        let summary: Vec<_> = changes
            .iter()
            .map(|c| (c.key.as_int().unwrap(), c.change_type.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![(10, ChangeType::Remove), (201, ChangeType::Modify), (1000, ChangeType::Add)]
        );
        assert_eq!(changes[1].new_value, Some(Value::from("changed")));
    }
}
