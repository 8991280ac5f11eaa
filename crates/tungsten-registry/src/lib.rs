//! Tungsten Registry - discovery reconciliation and entity registries
//!
//! The heart of the platform: diffing discovery sweeps against persisted
//! state, and the registries that own applications, endpoints, writer
//! groups, and agent registrations.

pub mod agent;
pub mod application;
pub mod endpoint;
pub mod reconcile;
pub mod writer_group;

pub use agent::{
    AgentRecord, AgentRegistry, DiscovererRegistry, GatewayRegistry, PublisherRegistry,
    SupervisorRegistry,
};
pub use application::{ApplicationRegistry, DiscoverySummary};
pub use endpoint::EndpointRegistry;
pub use reconcile::{Reconcilable, ReconcileSummary, Reconciler};
pub use writer_group::WriterGroupRegistry;
