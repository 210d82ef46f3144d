use crate::core::metrics::{MetricError, Result};
use log::trace;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use tokio::sync::RwLock;

/// A thread-safe keyed store for metric values.
///
/// Writes take the exclusive lock, reads take the shared lock.
/// [MetricStore::get_all] only holds the lock for the duration of the copy, so callers can iterate
/// the returned map without blocking writers and without observing an entry mid-update.
#[derive(Debug)]
pub struct MetricStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> MetricStore<K, V>
where
    K: Debug + Display + Clone + Eq + Hash + Send + Sync,
    V: Debug + Clone + Send + Sync,
{
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Replace or create the entry of the given key.
    pub async fn set(&self, key: K, value: V) {
        trace!("Storing metric entry {} with value {:?}", key, value);
        self.entries.write().await.insert(key, value);
    }

    /// Atomically update the entry of the given key.
    /// The `update` function receives the current value, if any, and returns the new value.
    ///
    /// It returns the new value that has been stored.
    pub async fn update<F>(&self, key: K, update: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let mut entries = self.entries.write().await;
        let value = update(entries.get(&key));
        trace!("Updating metric entry {} to value {:?}", key, value);
        entries.insert(key, value.clone());
        value
    }

    /// Get the value of the given key.
    ///
    /// It returns [MetricError::NotFound] when the key is unknown.
    pub async fn get(&self, key: &K) -> Result<V> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| MetricError::NotFound(key.to_string()))
    }

    /// Get an independent copy of all entries within the store.
    pub async fn get_all(&self) -> HashMap<K, V> {
        self.entries.read().await.clone()
    }

    /// Remove the entry of the given key.
    /// It returns the removed value, if one was present.
    pub async fn unset(&self, key: &K) -> Option<V> {
        trace!("Removing metric entry {}", key);
        self.entries.write().await.remove(key)
    }

    /// Returns the number of entries within the store.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true when the store doesn't contain any entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<K, V> Default for MetricStore<K, V>
where
    K: Debug + Display + Clone + Eq + Hash + Send + Sync,
    V: Debug + Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_logger;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_and_get() {
        init_logger!();
        let store = MetricStore::<String, f64>::new();

        store.set("Alloc".to_string(), 1.0).await;
        store.set("Alloc".to_string(), 2.0).await;
        let result = store.get(&"Alloc".to_string()).await;

        assert_eq!(Ok(2.0), result);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        init_logger!();
        let store = MetricStore::<String, f64>::new();

        let result = store.get(&"lorem".to_string()).await;

        assert_eq!(Err(MetricError::NotFound("lorem".to_string())), result);
    }

    #[tokio::test]
    async fn test_unset() {
        init_logger!();
        let store = MetricStore::<String, i64>::new();
        store.set("PollCount".to_string(), 10).await;

        let result = store.unset(&"PollCount".to_string()).await;

        assert_eq!(Some(10), result);
        assert!(store.is_empty().await, "expected the store to be empty");
    }

    #[tokio::test]
    async fn test_get_all_is_independent_copy() {
        init_logger!();
        let store = MetricStore::<String, i64>::new();
        store.set("lorem".to_string(), 1).await;

        let mut result = store.get_all().await;
        result.insert("ipsum".to_string(), 2);
        store.set("lorem".to_string(), 3).await;

        assert_eq!(Some(&1), result.get("lorem"));
        assert_eq!(1, store.len().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        init_logger!();
        let store = Arc::new(MetricStore::<String, i64>::new());
        let mut handles = vec![];

        for writer in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    store
                        .update("total".to_string(), |e| e.copied().unwrap_or(0) + 1)
                        .await;
                    store.set(format!("writer-{}", writer), i).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let result = store.get_all().await;
        assert_eq!(Some(&2000), result.get("total"));
        for writer in 0..8 {
            assert_eq!(Some(&249), result.get(&format!("writer-{}", writer)));
        }
    }
}
