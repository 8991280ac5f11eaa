//! Caller-side read-modify-write helpers
//!
//! The store contract is deliberately retry-free: mutate closures capture
//! intent, not raw values, so only the caller can recompute a patch against
//! a fresh read. These helpers implement that documented responsibility as
//! a bounded loop - unbounded retry can spin indefinitely under sustained
//! contention, so after `MAX_UPDATE_ATTEMPTS` re-reads the final
//! `ResourceOutOfDate` surfaces and sweep callers treat it like any other
//! per-item failure.

use tracing::debug;

use tungsten_common::{RegistryError, Result};

use crate::document::{Document, DocumentStore, Versioned};

/// Re-read cap for the optimistic-concurrency loops
pub const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Read the record, apply `mutate`, and conditionally replace it.
///
/// `mutate` returns false to signal "nothing to write"; the current record
/// is returned untouched. A concurrent write between the read and the
/// replace surfaces `ResourceOutOfDate` - use `update_with_retry` unless
/// the caller runs its own loop.
pub async fn update<T, F>(
    store: &dyn DocumentStore<T>,
    id: &str,
    mut mutate: F,
) -> Result<Versioned<T>>
where
    T: Document,
    F: FnMut(&mut T) -> Result<bool> + Send,
{
    let current = store.find(id).await?;
    let mut value = current.value.clone();
    if !mutate(&mut value)? {
        return Ok(current);
    }
    store.replace(id, &current.generation, value).await
}

/// `update` wrapped in the bounded read-modify-retry loop.
///
/// The mutate closure is re-evaluated against a fresh read on every
/// attempt, so a lost race never writes a stale patch.
pub async fn update_with_retry<T, F>(
    store: &dyn DocumentStore<T>,
    id: &str,
    mut mutate: F,
) -> Result<Versioned<T>>
where
    T: Document,
    F: FnMut(&mut T) -> Result<bool> + Send,
{
    let mut attempt = 1;
    loop {
        match update(store, id, &mut mutate).await {
            Err(RegistryError::ResourceOutOfDate(_)) if attempt < MAX_UPDATE_ATTEMPTS => {
                debug!("update of '{}' lost a write race, retrying (attempt {})", id, attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Upsert: create via `factory` when absent, otherwise patch via `mutate`.
///
/// Losing a create race (`ResourceConflict`) or an update race
/// (`ResourceOutOfDate`) re-enters the loop so the surviving record is
/// patched instead.
pub async fn add_or_update<T, C, F>(
    store: &dyn DocumentStore<T>,
    id: &str,
    factory: C,
    mut mutate: F,
) -> Result<Versioned<T>>
where
    T: Document,
    C: Fn() -> T + Send + Sync,
    F: FnMut(&mut T) -> Result<bool> + Send,
{
    let mut attempt = 1;
    loop {
        let result = match store.try_find(id).await? {
            None => store.add(factory()).await,
            Some(current) => {
                let mut value = current.value.clone();
                if !mutate(&mut value)? {
                    return Ok(current);
                }
                store.replace(id, &current.generation, value).await
            }
        };
        match result {
            Err(RegistryError::ResourceConflict(_)) | Err(RegistryError::ResourceOutOfDate(_))
                if attempt < MAX_UPDATE_ATTEMPTS =>
            {
                debug!("upsert of '{}' lost a race, retrying (attempt {})", id, attempt);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Conditionally remove a record.
///
/// Returns the removed value, or `None` when the record is absent or the
/// predicate declines - for deletes, absence means "nothing to do".
pub async fn remove_if<T, P>(
    store: &dyn DocumentStore<T>,
    id: &str,
    predicate: P,
) -> Result<Option<T>>
where
    T: Document,
    P: Fn(&T) -> bool + Send + Sync,
{
    let mut attempt = 1;
    loop {
        let current = match store.try_find(id).await? {
            None => return Ok(None),
            Some(current) => current,
        };
        if !predicate(&current.value) {
            return Ok(None);
        }
        match store.remove(id, Some(&current.generation)).await {
            Ok(value) => return Ok(Some(value)),
            // Removed concurrently; nothing left to do
            Err(RegistryError::NotFound(_)) => return Ok(None),
            Err(RegistryError::ResourceOutOfDate(_)) if attempt < MAX_UPDATE_ATTEMPTS => {
                debug!("conditional remove of '{}' lost a race, retrying (attempt {})", id, attempt);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::document::{Filter, Page};
    use crate::memory::MemoryStore;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter {
        id: String,
        count: u64,
    }

    impl Document for Counter {
        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn counter(id: &str, count: u64) -> Counter {
        Counter {
            id: id.to_string(),
            count,
        }
    }

    /// Store wrapper that fails the first N replace calls with a stale
    /// generation, simulating a concurrent writer winning the race.
    struct ContendedStore {
        inner: MemoryStore<Counter>,
        failures_left: AtomicUsize,
    }

    impl ContendedStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures_left: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl DocumentStore<Counter> for ContendedStore {
        async fn find(&self, id: &str) -> Result<Versioned<Counter>> {
            self.inner.find(id).await
        }

        async fn try_find(&self, id: &str) -> Result<Option<Versioned<Counter>>> {
            self.inner.try_find(id).await
        }

        async fn add(&self, value: Counter) -> Result<Versioned<Counter>> {
            self.inner.add(value).await
        }

        async fn replace(
            &self,
            id: &str,
            expected_generation: &str,
            value: Counter,
        ) -> Result<Versioned<Counter>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RegistryError::ResourceOutOfDate(id.to_string()));
            }
            self.inner.replace(id, expected_generation, value).await
        }

        async fn remove(&self, id: &str, expected_generation: Option<&str>) -> Result<Counter> {
            self.inner.remove(id, expected_generation).await
        }

        async fn query(
            &self,
            filter: Filter<'_, Counter>,
            continuation: Option<&str>,
            page_size: usize,
        ) -> Result<Page<Counter>> {
            self.inner.query(filter, continuation, page_size).await
        }
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let store = MemoryStore::new();
        store.add(counter("c-1", 1)).await.unwrap();

        let updated = update(&store, "c-1", |c| {
            c.count += 1;
            Ok(true)
        })
        .await
        .unwrap();
        assert_eq!(updated.value.count, 2);
    }

    #[tokio::test]
    async fn test_update_noop_keeps_generation() {
        let store = MemoryStore::new();
        let added = store.add(counter("c-1", 1)).await.unwrap();

        let result = update(&store, "c-1", |_| Ok(false)).await.unwrap();
        assert_eq!(result.generation, added.generation);
    }

    #[tokio::test]
    async fn test_retry_survives_lost_race() {
        let store = ContendedStore::new(1);
        store.add(counter("c-1", 1)).await.unwrap();

        let mutate_calls = Arc::new(AtomicUsize::new(0));
        let calls = mutate_calls.clone();
        let updated = update_with_retry(&store, "c-1", move |c| {
            calls.fetch_add(1, Ordering::SeqCst);
            c.count = 42;
            Ok(true)
        })
        .await
        .unwrap();

        // The patch is recomputed against a fresh read, and the intended
        // write is not lost.
        assert_eq!(updated.value.count, 42);
        assert_eq!(mutate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_conflict() {
        let store = ContendedStore::new(MAX_UPDATE_ATTEMPTS + 1);
        store.add(counter("c-1", 1)).await.unwrap();

        let err = update_with_retry(&store, "c-1", |c| {
            c.count += 1;
            Ok(true)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::ResourceOutOfDate(_)));
    }

    #[tokio::test]
    async fn test_add_or_update_creates_then_patches() {
        let store = MemoryStore::new();

        let created = add_or_update(&store, "c-1", || counter("c-1", 1), |c| {
            c.count += 1;
            Ok(true)
        })
        .await
        .unwrap();
        assert_eq!(created.value.count, 1);

        let patched = add_or_update(&store, "c-1", || counter("c-1", 1), |c| {
            c.count += 1;
            Ok(true)
        })
        .await
        .unwrap();
        assert_eq!(patched.value.count, 2);
    }

    #[tokio::test]
    async fn test_remove_if_respects_predicate() {
        let store = MemoryStore::new();
        store.add(counter("c-1", 1)).await.unwrap();

        let kept = remove_if(&store, "c-1", |c| c.count > 5).await.unwrap();
        assert!(kept.is_none());
        assert!(store.try_find("c-1").await.unwrap().is_some());

        let removed = remove_if(&store, "c-1", |c| c.count == 1).await.unwrap();
        assert_eq!(removed.unwrap().count, 1);

        // Absent record is "nothing to do", not an error
        let absent = remove_if(&store, "c-1", |_| true).await.unwrap();
        assert!(absent.is_none());
    }
}
