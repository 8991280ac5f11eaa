//! Tungsten Core - event publishing and periodic sync hosts
//!
//! This crate provides:
//! - Typed per-entity-kind event buses with isolated listener dispatch
//! - The periodic sync host wrapping one idempotent background pass
//! - Per-host schedule configuration

pub mod config;
pub mod event;
pub mod sync;

pub use config::{HostSchedule, SyncConfig};
pub use event::{EntityEvent, EntityListener, EventBus, EventKind, Subscription};
pub use sync::{SyncHost, SyncJob};
