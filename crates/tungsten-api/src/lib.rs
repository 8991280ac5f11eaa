//! Tungsten API - Entity data model and discovery contract
//!
//! This crate defines the persisted record shapes shared by the registries
//! and the placement engine:
//! - Applications, endpoints, writer groups
//! - Agent registrations (publisher / supervisor / discoverer / gateway)
//! - The discovery input contract consumed by reconciliation

pub mod agent;
pub mod discovery;
pub mod model;

pub use agent::{
    AgentDesiredState, AgentObservedState, AgentState, DiscovererRegistration,
    GatewayRegistration, LogLevel, PublisherRegistration, SupervisorRegistration,
};
pub use discovery::{DiscoveryContext, DiscoveryResult};
pub use model::{
    ActivationState, ApplicationInfo, ApplicationType, ConnectionState, DataSetWriterInfo,
    EndpointInfo, EndpointState, OperationContext, SecurityMode, Visibility, WriterGroupInfo,
    WriterGroupPlacement, WriterGroupState,
};
