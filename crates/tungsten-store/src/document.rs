//! Document store contract
//!
//! Records are stored as `Versioned<T>`: the value plus an opaque generation
//! token regenerated on every committed write. All mutations are
//! conditional on the generation observed at read time; a mismatch surfaces
//! `ResourceOutOfDate` and the caller must re-read and recompute its patch.
//! The store itself never retries - see the helpers in `retry`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tungsten_common::Result;

use crate::shutdown::ShutdownSignal;

/// Page size used by sweeps that do not care to tune it
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A record that knows its own logical id
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> String;
}

/// A stored value together with its generation token
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    /// Opaque version token; changes on every committed write
    pub generation: String,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(generation: String, value: T) -> Self {
        Self { generation, value }
    }
}

/// One page of query results plus the token for the next page, if any
#[derive(Clone, Debug, Default)]
pub struct Page<T> {
    pub items: Vec<Versioned<T>>,
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.continuation.is_none()
    }
}

/// Query predicate over the stored value
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// Versioned CRUD + query over records keyed by logical id
#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    /// Find a record; `NotFound` if absent
    async fn find(&self, id: &str) -> Result<Versioned<T>>;

    /// Find a record, mapping absence to `None`
    async fn try_find(&self, id: &str) -> Result<Option<Versioned<T>>>;

    /// Create a record; `ResourceConflict` if the id already exists
    async fn add(&self, value: T) -> Result<Versioned<T>>;

    /// Replace a record if its generation still matches.
    ///
    /// `ResourceOutOfDate` on mismatch, `NotFound` if the record is absent.
    async fn replace(&self, id: &str, expected_generation: &str, value: T)
        -> Result<Versioned<T>>;

    /// Remove a record, optionally conditional on its generation.
    ///
    /// Returns the removed value; `NotFound` if absent.
    async fn remove(&self, id: &str, expected_generation: Option<&str>) -> Result<T>;

    /// Query matching records, paged by an opaque continuation token.
    ///
    /// Paging is id-ordered; a record created behind an already-consumed
    /// token is picked up on the next sweep, not this one.
    async fn query(
        &self,
        filter: Filter<'_, T>,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<Page<T>>;
}

/// Drain a query to completion, one page at a time.
///
/// The shutdown signal is checked before every page fetch; cancellation
/// surfaces as `Cancelled` and leaves nothing half-applied because this
/// helper only reads.
pub async fn query_all<T: Document>(
    store: &dyn DocumentStore<T>,
    filter: Filter<'_, T>,
    signal: &ShutdownSignal,
    page_size: usize,
) -> Result<Vec<Versioned<T>>> {
    let mut items = Vec::new();
    let mut continuation: Option<String> = None;
    loop {
        signal.check()?;
        let page = store.query(filter, continuation.as_deref(), page_size).await?;
        items.extend(page.items);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    Ok(items)
}
