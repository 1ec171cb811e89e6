//! Per-pass batch collection.
//!
//! A [`BatchCollector`] gathers the identifiers every sibling in one
//! field-resolution pass needs, dispatches them once, and hands back a
//! [`BatchResults`] the pass uses to distribute values to each parent. The
//! collector is consumed by dispatch, so a batch can never outlive its pass:
//! holding a collector means the pass is pending, and once `dispatch` returns
//! only the outcome recorded in [`PassState`] remains.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::ServiceError;

/// How a dispatched pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Fulfilled,
    PartiallyFulfilled,
    Failed,
}

#[derive(Debug)]
pub struct BatchCollector<K> {
    keys: Vec<K>,
    seen: HashSet<K>,
    limit: Option<usize>,
}

impl<K> BatchCollector<K>
where
    K: Eq + Hash + Clone,
{
    /// `limit` caps the number of keys per backend call; `None` means one call.
    pub fn new(limit: Option<usize>) -> Self {
        BatchCollector {
            keys: Vec::new(),
            seen: HashSet::new(),
            limit: limit.filter(|l| *l > 0),
        }
    }

    /// Duplicates are dropped; first-seen order is kept.
    pub fn push(&mut self, key: K) {
        if self.seen.insert(key.clone()) {
            self.keys.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn chunks(self) -> Vec<Vec<K>> {
        match self.limit {
            Some(limit) => self.keys.chunks(limit).map(<[K]>::to_vec).collect(),
            None if self.keys.is_empty() => Vec::new(),
            None => vec![self.keys],
        }
    }

    /// Fetch all keys with as few calls as the limit allows. Chunks run
    /// concurrently; `key_of` maps a returned value back to the key it answers.
    pub async fn dispatch<V, F, Fut, KeyOf>(self, fetch: F, key_of: KeyOf) -> BatchResults<K, V>
    where
        F: Fn(Vec<K>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, ServiceError>>,
        KeyOf: Fn(&V) -> K,
    {
        let chunks = self.chunks();
        let calls = chunks.len();
        tracing::debug!(calls, keys = chunks.iter().map(Vec::len).sum::<usize>(), "dispatching batch");

        let outcomes = join_all(chunks.into_iter().map(|chunk| {
            let request = chunk.clone();
            let call = fetch(request);
            async move { (chunk, call.await) }
        }))
        .await;

        let mut results = BatchResults::new(calls);
        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(values) => {
                    let requested: HashSet<&K> = chunk.iter().collect();
                    for value in values {
                        let key = key_of(&value);
                        if requested.contains(&key) {
                            results.found.insert(key, Arc::new(value));
                        }
                    }
                }
                Err(err) => {
                    results.failed_calls += 1;
                    for key in chunk {
                        results.failed.insert(key, err.clone());
                    }
                }
            }
        }
        results
    }

    /// For backends without a batch RPC: one concurrent call per distinct key.
    pub async fn dispatch_each<V, F, Fut>(self, fetch: F) -> BatchResults<K, V>
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, ServiceError>>,
    {
        let keys = self.keys;
        let calls = keys.len();
        tracing::debug!(calls, "dispatching per-key calls");

        let outcomes = join_all(keys.into_iter().map(|key| {
            let call = fetch(key.clone());
            async move { (key, call.await) }
        }))
        .await;

        let mut results = BatchResults::new(calls);
        for (key, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    results.found.insert(key, Arc::new(value));
                }
                Err(err) => {
                    results.failed_calls += 1;
                    results.failed.insert(key, err);
                }
            }
        }
        results
    }
}

#[derive(Debug)]
pub struct BatchResults<K, V> {
    found: HashMap<K, Arc<V>>,
    failed: HashMap<K, ServiceError>,
    calls: usize,
    failed_calls: usize,
}

impl<K, V> BatchResults<K, V>
where
    K: Eq + Hash,
{
    fn new(calls: usize) -> Self {
        BatchResults {
            found: HashMap::new(),
            failed: HashMap::new(),
            calls,
            failed_calls: 0,
        }
    }

    /// `Ok(None)` means the backend answered but did not know the key.
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, ServiceError> {
        if let Some(err) = self.failed.get(key) {
            return Err(err.clone());
        }
        Ok(self.found.get(key).cloned())
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn state(&self) -> PassState {
        match self.failed_calls {
            0 => PassState::Fulfilled,
            n if n == self.calls => PassState::Failed,
            _ => PassState::PartiallyFulfilled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dispatches_once_and_deduplicates() {
        let calls = AtomicUsize::new(0);
        let mut collector = BatchCollector::new(None);
        for key in ["a", "b", "a", "c", "b"] {
            collector.push(key.to_string());
        }
        assert_eq!(collector.len(), 3);

        let results = collector
            .dispatch(
                |keys: Vec<String>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        assert_eq!(keys, vec!["a", "b", "c"]);
                        Ok::<_, ServiceError>(
                            keys.into_iter()
                                .filter(|k| k != "b")
                                .map(|k| (k.clone(), k.to_uppercase()))
                                .collect::<Vec<_>>(),
                        )
                    }
                },
                |(k, _): &(String, String)| k.clone(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.state(), PassState::Fulfilled);
        assert_eq!(results.get(&"a".to_string()).unwrap().unwrap().1, "A");
        assert!(results.get(&"b".to_string()).unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_batch_issues_no_call() {
        let calls = AtomicUsize::new(0);
        let collector: BatchCollector<String> = BatchCollector::new(None);
        assert!(collector.is_empty());
        let results = collector
            .dispatch(
                |keys: Vec<String>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, ServiceError>(keys) }
                },
                |v: &String| v.clone(),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(results.calls(), 0);
        assert_eq!(results.state(), PassState::Fulfilled);
    }

    #[tokio::test]
    async fn failed_chunk_makes_pass_partial() {
        let mut collector = BatchCollector::new(Some(2));
        for key in 1..=5u32 {
            collector.push(key);
        }
        let results = collector
            .dispatch(
                |keys: Vec<u32>| async move {
                    if keys.contains(&3) {
                        Err(ServiceError::unavailable("catalog shard down"))
                    } else {
                        Ok::<_, ServiceError>(keys)
                    }
                },
                |v: &u32| *v,
            )
            .await;

        assert_eq!(results.calls(), 3);
        assert_eq!(results.state(), PassState::PartiallyFulfilled);
        assert_eq!(results.get(&1).unwrap().as_deref(), Some(&1));
        assert_eq!(results.get(&5).unwrap().as_deref(), Some(&5));
        assert!(results.get(&3).is_err());
        assert!(results.get(&4).is_err());
    }

    #[tokio::test]
    async fn every_chunk_failing_is_failed() {
        let mut collector = BatchCollector::new(None);
        collector.push(1u32);
        let results = collector
            .dispatch(
                |_keys: Vec<u32>| async { Err::<Vec<u32>, _>(ServiceError::internal("boom")) },
                |v: &u32| *v,
            )
            .await;
        assert_eq!(results.state(), PassState::Failed);
    }
}
