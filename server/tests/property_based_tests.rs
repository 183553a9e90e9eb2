use proptest::prelude::*;
use server::common::RequestError;
use server::config::EngineConfig;
use server::engine::{ResultTally, UserOutcome, UserRef};
use server::kvstore::{CacheKeyStore, KvLockStore, KvStore, LockStore, MemoryKvStore, lock_key};
use server::request::BulkAddPayload;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn outcome_strategy() -> impl Strategy<Value = UserOutcome> {
    prop_oneof![
        any::<bool>().prop_map(|joined_parent| UserOutcome::Added { joined_parent }),
        Just(UserOutcome::ErroredAfterParentJoin),
        Just(UserOutcome::Errored),
        Just(UserOutcome::SkippedGuest),
        Just(UserOutcome::SkippedNotParentMember),
        Just(UserOutcome::Ignored),
    ]
}

#[derive(Debug, Clone)]
enum LockOp {
    Lock(usize),
    Unlock(usize),
}

fn lock_op_strategy() -> impl Strategy<Value = LockOp> {
    prop_oneof![
        (0usize..4).prop_map(LockOp::Lock),
        (0usize..4).prop_map(LockOp::Unlock),
    ]
}

#[cfg(test)]
mod tally_property_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_each_user_reaches_at_most_one_counter(
            outcomes in prop::collection::vec(outcome_strategy(), 0..200)
        ) {
            let mut tally = ResultTally::new();
            for outcome in &outcomes {
                tally.record(*outcome);
            }

            let counted = outcomes
                .iter()
                .filter(|o| **o != UserOutcome::Ignored)
                .count();

            // Property: every non-ignored user lands in exactly one terminal counter
            prop_assert_eq!(tally.accounted(), counted);

            // Property: joining the team is only ever a side effect of a counted user
            prop_assert!(tally.added_to_parent <= tally.succeeded + tally.errored);
        }

        #[test]
        fn test_user_ref_prefers_id(
            id in " ?[a-z0-9]{0,12}",
            handle in "@?[a-z0-9]{0,12}"
        ) {
            let user = UserRef::from_parts(&id, &handle);
            let bare_handle = handle.trim_start_matches('@');

            // Property: only an entry with both fields empty is ignored
            prop_assert_eq!(user.is_empty(), id.is_empty() && handle.is_empty());

            if !id.trim().is_empty() {
                prop_assert_eq!(user, UserRef::ById(id.trim().to_string()));
            } else if !bare_handle.is_empty() {
                prop_assert_eq!(user, UserRef::ByHandle(bare_handle.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod lock_property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_lock_store_matches_set_model(
            ops in prop::collection::vec(lock_op_strategy(), 1..40)
        ) {
            let rt = runtime();
            rt.block_on(async {
                let backing = Arc::new(MemoryKvStore::new());
                let locks = KvLockStore::with_cache(backing.clone(), &EngineConfig::default());
                let mut held = HashSet::new();

                for op in ops {
                    match op {
                        LockOp::Lock(n) => {
                            let key = format!("channel-{n}");
                            let result = locks.lock(&key).await;
                            // Property: a lock is granted iff nobody holds it
                            prop_assert_eq!(result.is_ok(), held.insert(n));
                        }
                        LockOp::Unlock(n) => {
                            let key = format!("channel-{n}");
                            // Property: unlock is idempotent
                            prop_assert!(locks.unlock(&key).await.is_ok());
                            held.remove(&n);
                        }
                    }
                }

                for n in 0..4 {
                    let key = format!("channel-{n}");
                    prop_assert_eq!(locks.is_locked(&key).await, held.contains(&n));
                    // Property: the backing store agrees with the cached view
                    prop_assert_eq!(
                        backing.exists(&lock_key(&key)).await.unwrap(),
                        held.contains(&n)
                    );
                }
                Ok(())
            })?;
        }
    }
}

#[cfg(test)]
mod cached_store_property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_store_then_load_returns_value(
            writes in prop::collection::vec(
                ("[a-z_]{1,6}", prop::collection::vec(any::<u8>(), 0..64)),
                1..30
            )
        ) {
            let rt = runtime();
            rt.block_on(async {
                let backing = Arc::new(MemoryKvStore::new());
                let store = CacheKeyStore::new(
                    backing.clone(),
                    Duration::from_secs(30),
                    Duration::from_secs(5),
                );
                let mut model = HashMap::new();

                for (key, value) in writes {
                    store.store(&key, &value).await.unwrap();
                    // Property: a write is immediately readable through the store
                    prop_assert_eq!(store.load(&key).await.unwrap(), value.clone());
                    model.insert(key, value);
                }

                for (key, value) in &model {
                    // Property: last write wins in both the cache and the backing store
                    let cached = store.cached(key).await;
                    prop_assert_eq!(cached.as_ref(), Some(value));
                    prop_assert_eq!(&backing.load(key).await.unwrap(), value);
                }
                Ok(())
            })?;
        }
    }
}

#[cfg(test)]
mod payload_property_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_oversized_payload_is_rejected(
            max_kb in 1u64..8,
            extra in 1usize..2048
        ) {
            let bytes = vec![b' '; (max_kb as usize) * 1024 + extra];

            prop_assert_eq!(
                BulkAddPayload::from_json(&bytes, max_kb).unwrap_err(),
                RequestError::TooLarge { max_kb }
            );
        }

        #[test]
        fn test_user_list_size_is_preserved(
            ids in prop::collection::vec("[a-z0-9]{1,8}", 1..50)
        ) {
            let users: Vec<_> = ids
                .iter()
                .map(|id| serde_json::json!({ "user_id": id }))
                .collect();
            let body = serde_json::json!({ "channel_id": "c1", "users": users }).to_string();

            let request = BulkAddPayload::from_json(body.as_bytes(), 256)
                .unwrap()
                .into_request("admin")
                .unwrap();

            prop_assert_eq!(request.users.len(), ids.len());
            prop_assert!(request.users.iter().all(|u| matches!(u, UserRef::ById(_))));
        }
    }
}
