//! Tungsten Store - versioned document store abstraction
//!
//! This crate provides:
//! - The `DocumentStore` contract: CRUD + query with optimistic concurrency
//!   via opaque generation tokens and continuation-token paging
//! - A DashMap-backed in-memory reference implementation
//! - The caller-side read-modify-retry helpers the contract documents
//! - A shutdown signal checked at page boundaries by sweep loops

pub mod document;
pub mod memory;
pub mod retry;
pub mod shutdown;

pub use document::{
    query_all, Document, DocumentStore, Filter, Page, Versioned, DEFAULT_PAGE_SIZE,
};
pub use memory::MemoryStore;
pub use retry::{add_or_update, remove_if, update, update_with_retry, MAX_UPDATE_ATTEMPTS};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
