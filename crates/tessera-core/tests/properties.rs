//! Property tests: chunking is a pure function of content

use proptest::prelude::*;
use std::sync::Arc;
use tessera_blockstore::MemoryBlockStore;
use tessera_core::prolly::OrderKey;
use tessera_core::{ChunkConfig, Collection, List, Map, Set, Value, ValueStore};

fn store() -> Arc<ValueStore<MemoryBlockStore>> {
    Arc::new(ValueStore::with_config(Arc::new(MemoryBlockStore::new()), ChunkConfig::small()).unwrap())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[derive(Clone, Debug)]
enum Edit {
    Insert(usize, i64),
    Remove(usize),
    Set(usize, i64),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), any::<i64>()).prop_map(|(i, v)| Edit::Insert(i, v)),
        any::<usize>().prop_map(Edit::Remove),
        (any::<usize>(), any::<i64>()).prop_map(|(i, v)| Edit::Set(i, v)),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::Int),
        "[a-z]{0,6}".prop_map(Value::from),
        proptest::collection::vec(any::<u8>(), 0..4).prop_map(Value::Bytes),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_incremental_edits_match_direct_build(
        initial in proptest::collection::vec(any::<i64>(), 0..300),
        edits in proptest::collection::vec(edit(), 1..12),
    ) {
        runtime().block_on(async {
            let store = store();
            let mut model: Vec<Value> = initial.into_iter().map(Value::Int).collect();
            let mut list = List::from_values(Arc::clone(&store), model.clone()).await.unwrap();

            for edit in edits {
                list = match edit {
                    Edit::Insert(i, v) => {
                        let at = i % (model.len() + 1);
                        model.insert(at, Value::Int(v));
                        list.insert(at as u64, Value::Int(v)).await.unwrap()
                    }
                    Edit::Remove(i) if !model.is_empty() => {
                        let at = i % model.len();
                        model.remove(at);
                        list.remove_at(at as u64).await.unwrap()
                    }
                    Edit::Set(i, v) if !model.is_empty() => {
                        let at = i % model.len();
                        model[at] = Value::Int(v);
                        list.set(at as u64, Value::Int(v)).await.unwrap()
                    }
                    _ => list,
                };
            }

            let direct = List::from_values(Arc::clone(&store), model.clone()).await.unwrap();
            prop_assert_eq!(list.hash(), direct.hash());
            prop_assert_eq!(list.values().await.unwrap(), model);
            Ok(())
        })?;
    }

    #[test]
    fn prop_set_iterates_in_strictly_increasing_order(
        values in proptest::collection::vec(value(), 0..200),
    ) {
        runtime().block_on(async {
            let set = Set::from_values(store(), values).await.unwrap();
            let keys: Vec<OrderKey> = set
                .values()
                .await
                .unwrap()
                .iter()
                .map(OrderKey::of_value)
                .collect();

            prop_assert_eq!(keys.len() as u64, set.len());
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
            Ok(())
        })?;
    }

    #[test]
    fn prop_map_set_twice_equals_once(
        keys in proptest::collection::vec(-500i64..500, 1..150),
        key in -500i64..500,
        value in any::<i64>(),
    ) {
        runtime().block_on(async {
            let entries = keys.iter().map(|&k| (Value::Int(k), Value::Int(k))).collect();
            let map = Map::from_entries(store(), entries).await.unwrap();

            let once = map.set(Value::Int(key), Value::Int(value)).await.unwrap();
            let twice = once.set(Value::Int(key), Value::Int(value)).await.unwrap();
            prop_assert_eq!(once.hash(), twice.hash());
            prop_assert_eq!(once.get(&Value::Int(key)).await.unwrap(), Some(Value::Int(value)));
            Ok(())
        })?;
    }

    #[test]
    fn prop_list_get_matches_iteration(
        values in proptest::collection::vec(value(), 1..250),
        lookups in proptest::collection::vec(any::<usize>(), 1..10),
    ) {
        runtime().block_on(async {
            let list = List::from_values(store(), values.clone()).await.unwrap();

            let iterated = list.iterator().await.unwrap().collect().await.unwrap();
            prop_assert_eq!(&iterated, &values);
            for lookup in lookups {
                let i = lookup % values.len();
                prop_assert_eq!(list.get(i as u64).await.unwrap(), values[i].clone());
            }
            Ok(())
        })?;
    }
}
