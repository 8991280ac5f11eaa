//! In-memory document store
//!
//! DashMap-backed reference implementation of `DocumentStore`. Conditional
//! writes are atomic per entry: the generation comparison and the write
//! happen under the entry's shard lock.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use tungsten_common::{RegistryError, Result};

use crate::document::{Document, DocumentStore, Filter, Page, Versioned};

/// DashMap-backed store keyed by logical id
pub struct MemoryStore<T> {
    records: DashMap<String, Versioned<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn next_generation() -> String {
    Uuid::new_v4().to_string()
}

fn encode_token(id: &str) -> String {
    BASE64.encode(id.as_bytes())
}

fn decode_token(token: &str) -> Result<String> {
    let bytes = BASE64
        .decode(token)
        .map_err(|e| RegistryError::InvalidArgument(format!("bad continuation token: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| RegistryError::InvalidArgument(format!("bad continuation token: {}", e)))
}

#[async_trait]
impl<T: Document> DocumentStore<T> for MemoryStore<T> {
    async fn find(&self, id: &str) -> Result<Versioned<T>> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn try_find(&self, id: &str) -> Result<Option<Versioned<T>>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn add(&self, value: T) -> Result<Versioned<T>> {
        let id = value.id();
        match self.records.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::ResourceConflict(id)),
            Entry::Vacant(slot) => {
                let versioned = Versioned::new(next_generation(), value);
                slot.insert(versioned.clone());
                Ok(versioned)
            }
        }
    }

    async fn replace(
        &self,
        id: &str,
        expected_generation: &str,
        value: T,
    ) -> Result<Versioned<T>> {
        match self.records.get_mut(id) {
            None => Err(RegistryError::NotFound(id.to_string())),
            Some(mut entry) => {
                if entry.generation != expected_generation {
                    return Err(RegistryError::ResourceOutOfDate(id.to_string()));
                }
                let versioned = Versioned::new(next_generation(), value);
                *entry = versioned.clone();
                Ok(versioned)
            }
        }
    }

    async fn remove(&self, id: &str, expected_generation: Option<&str>) -> Result<T> {
        let removed = self.records.remove_if(id, |_, entry| match expected_generation {
            Some(expected) => entry.generation == expected,
            None => true,
        });
        match removed {
            Some((_, entry)) => Ok(entry.value),
            None => {
                // Distinguish "absent" from "generation mismatch"
                if self.records.contains_key(id) {
                    Err(RegistryError::ResourceOutOfDate(id.to_string()))
                } else {
                    Err(RegistryError::NotFound(id.to_string()))
                }
            }
        }
    }

    async fn query(
        &self,
        filter: Filter<'_, T>,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<Page<T>> {
        let after = match continuation {
            Some(token) => Some(decode_token(token)?),
            None => None,
        };

        let mut matching: Vec<Versioned<T>> = self
            .records
            .iter()
            .filter(|entry| filter(&entry.value().value))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| a.value.id().cmp(&b.value.id()));

        let start = match &after {
            Some(last_id) => matching
                .iter()
                .position(|item| item.value.id().as_str() > last_id.as_str())
                .unwrap_or(matching.len()),
            None => 0,
        };

        let end = (start + page_size).min(matching.len());
        let items: Vec<Versioned<T>> = matching[start..end].to_vec();
        let continuation = if end < matching.len() {
            items.last().map(|item| encode_token(&item.value.id()))
        } else {
            None
        };

        Ok(Page {
            items,
            continuation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Record {
        id: String,
        payload: String,
    }

    impl Document for Record {
        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn record(id: &str, payload: &str) -> Record {
        Record {
            id: id.to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_then_find() {
        let store = MemoryStore::new();
        let added = store.add(record("r-1", "a")).await.unwrap();
        assert!(!added.generation.is_empty());

        let found = store.find("r-1").await.unwrap();
        assert_eq!(found, added);

        let err = store.find("r-2").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_add_duplicate_conflicts() {
        let store = MemoryStore::new();
        store.add(record("r-1", "a")).await.unwrap();
        let err = store.add(record("r-1", "b")).await.unwrap_err();
        assert!(matches!(err, RegistryError::ResourceConflict(_)));
    }

    #[tokio::test]
    async fn test_replace_requires_current_generation() {
        let store = MemoryStore::new();
        let added = store.add(record("r-1", "a")).await.unwrap();

        let replaced = store
            .replace("r-1", &added.generation, record("r-1", "b"))
            .await
            .unwrap();
        assert_ne!(replaced.generation, added.generation);
        assert_eq!(replaced.value.payload, "b");

        // Stale generation is rejected
        let err = store
            .replace("r-1", &added.generation, record("r-1", "c"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ResourceOutOfDate(_)));
        assert_eq!(store.find("r-1").await.unwrap().value.payload, "b");
    }

    #[tokio::test]
    async fn test_conditional_remove() {
        let store = MemoryStore::new();
        let added = store.add(record("r-1", "a")).await.unwrap();

        let err = store.remove("r-1", Some("stale")).await.unwrap_err();
        assert!(matches!(err, RegistryError::ResourceOutOfDate(_)));

        let removed = store.remove("r-1", Some(&added.generation)).await.unwrap();
        assert_eq!(removed.payload, "a");

        let err = store.remove("r-1", None).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_query_pages_in_id_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .add(record(&format!("r-{}", i), "x"))
                .await
                .unwrap();
        }

        let first = store.query(&|_| true, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].value.id, "r-0");
        assert!(!first.is_last());

        let second = store
            .query(&|_| true, first.continuation.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.items[0].value.id, "r-2");

        let third = store
            .query(&|_| true, second.continuation.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.is_last());
    }

    #[tokio::test]
    async fn test_query_filter() {
        let store = MemoryStore::new();
        store.add(record("r-1", "keep")).await.unwrap();
        store.add(record("r-2", "drop")).await.unwrap();

        let page = store
            .query(&|r: &Record| r.payload == "keep", None, 10)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].value.id, "r-1");
    }

    #[tokio::test]
    async fn test_bad_continuation_token() {
        let store: MemoryStore<Record> = MemoryStore::new();
        let err = store
            .query(&|_| true, Some("not base64 !!!"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument(_)));
    }
}
