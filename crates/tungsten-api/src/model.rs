//! Core entity model for the Tungsten registry
//!
//! Every persisted entity carries a stable id derived from its
//! identity-defining fields, a `not_seen_since` timestamp (None while
//! actively observed) and created/updated audit contexts. The optimistic
//! concurrency token lives in the store's `Versioned<T>` wrapper, not here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tungsten_common::identity;
use tungsten_store::Document;

/// Who performed an operation, and when
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    pub authority_id: String,
    pub time: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(authority_id: &str) -> Self {
        Self {
            authority_id: authority_id.to_string(),
            time: Utc::now(),
        }
    }
}

/// Canonical visibility of a tracked entity.
///
/// `Found` means the record is actively observed (`not_seen_since` is None).
/// `Lost` means its discoverer stopped reporting it (`not_seen_since` set);
/// the record stays in the store. `Deleted` means the record is physically
/// absent, reachable only through explicit unregister or a purge of lost
/// records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Found,
    Lost,
    Deleted,
}

impl Visibility {
    /// Visibility of a record that may or may not exist in the store
    pub fn of(not_seen_since: Option<&Option<DateTime<Utc>>>) -> Self {
        match not_seen_since {
            None => Visibility::Deleted,
            Some(None) => Visibility::Found,
            Some(Some(_)) => Visibility::Lost,
        }
    }
}

/// OPC-UA application type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationType {
    #[default]
    Server,
    Client,
    ClientAndServer,
    DiscoveryServer,
}

impl ApplicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationType::Server => "Server",
            ApplicationType::Client => "Client",
            ApplicationType::ClientAndServer => "ClientAndServer",
            ApplicationType::DiscoveryServer => "DiscoveryServer",
        }
    }
}

impl Display for ApplicationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Server" => Ok(ApplicationType::Server),
            "Client" => Ok(ApplicationType::Client),
            "ClientAndServer" => Ok(ApplicationType::ClientAndServer),
            "DiscoveryServer" => Ok(ApplicationType::DiscoveryServer),
            _ => Err(format!("Invalid application type: {}", s)),
        }
    }
}

/// OPC-UA message security mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityMode {
    #[default]
    Best,
    None,
    Sign,
    SignAndEncrypt,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Best => "Best",
            SecurityMode::None => "None",
            SecurityMode::Sign => "Sign",
            SecurityMode::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl Display for SecurityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An OPC-UA application tracked by the registry
///
/// Identity is (scope, application type, uppercased application uri); the
/// id is recomputed from these on every write.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    /// Stable id derived from identity fields
    pub application_id: String,

    pub application_uri: String,
    pub application_type: ApplicationType,

    #[serde(default)]
    pub application_name: String,
    #[serde(default)]
    pub product_uri: String,

    /// Server capabilities, e.g. "DA", "LDS"
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub discovery_urls: BTreeSet<String>,
    #[serde(default)]
    pub gateway_server_uri: String,
    #[serde(default)]
    pub discovery_profile_uri: String,
    #[serde(default)]
    pub host_addresses: BTreeSet<String>,

    /// Site this application belongs to; falls back to the discoverer as
    /// the identity scope when empty
    #[serde(default)]
    pub site_id: String,
    /// Discoverer that reported this application
    #[serde(default)]
    pub discoverer_id: String,

    /// None while the application is actively observed
    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl ApplicationInfo {
    /// Identity scope: the site when known, else the reporting discoverer
    pub fn scope(&self) -> &str {
        if !self.site_id.is_empty() {
            &self.site_id
        } else if !self.discoverer_id.is_empty() {
            &self.discoverer_id
        } else {
            tungsten_common::DEFAULT_SCOPE
        }
    }

    /// Recompute the stable id from the identity-defining fields
    pub fn compute_id(&self) -> String {
        identity::application_id(
            self.scope(),
            self.application_type.as_str(),
            &self.application_uri,
        )
    }

    /// Assign the computed id, returning self for chaining
    pub fn with_computed_id(mut self) -> Self {
        self.application_id = self.compute_id();
        self
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::of(Some(&self.not_seen_since))
    }
}

impl Document for ApplicationInfo {
    fn id(&self) -> String {
        self.application_id.clone()
    }
}

/// Requested run state of an endpoint, owned by the operator rather than
/// by discovery. Survives discovery patches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationState {
    #[default]
    Deactivated,
    Activated,
    ActivatedAndConnected,
}

/// Raw transport-level connectivity reported by the supervising agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Connectivity exposed to callers, derived from the activation state and
/// the raw connection state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
}

/// An OPC-UA endpoint owned by an application
///
/// Identity is (application id, endpoint url, security mode, security
/// policy). `activation_state` is caller-owned and must survive patches
/// applied from discovery data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub endpoint_id: String,

    /// Owning application
    pub application_id: String,

    pub endpoint_url: String,
    pub security_mode: SecurityMode,
    #[serde(default)]
    pub security_policy: String,
    #[serde(default)]
    pub security_level: Option<u32>,
    #[serde(default)]
    pub certificate_thumbprint: String,

    /// Supervisor responsible for connectivity to this endpoint
    #[serde(default)]
    pub supervisor_id: String,

    #[serde(default)]
    pub activation_state: ActivationState,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl EndpointInfo {
    /// Recompute the stable id from the identity-defining fields
    pub fn compute_id(&self) -> String {
        identity::endpoint_id(
            &self.application_id,
            &self.endpoint_url,
            self.security_mode.as_str(),
            &self.security_policy,
        )
    }

    /// Assign the computed id, returning self for chaining
    pub fn with_computed_id(mut self) -> Self {
        self.endpoint_id = self.compute_id();
        self
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::of(Some(&self.not_seen_since))
    }

    /// Derive the exposed connectivity from the raw reported state.
    ///
    /// An activated endpoint whose transport is down is `Connecting`, never
    /// `Disconnected` - the supervisor keeps reconnecting until the endpoint
    /// is deactivated.
    pub fn endpoint_state(&self, raw: ConnectionState) -> EndpointState {
        match (self.activation_state, raw) {
            (ActivationState::Deactivated, _) => EndpointState::Disconnected,
            (ActivationState::Activated, ConnectionState::Disconnected) => {
                EndpointState::Connecting
            }
            (ActivationState::Activated, ConnectionState::Connected) => EndpointState::Ready,
            (ActivationState::ActivatedAndConnected, _) => EndpointState::Ready,
        }
    }
}

impl Document for EndpointInfo {
    fn id(&self) -> String {
        self.endpoint_id.clone()
    }
}

/// Run state of a writer group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriterGroupState {
    #[default]
    Pending,
    Disabled,
    Publishing,
}

/// A data-set writer tracked as a marker on its owning group
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSetWriterInfo {
    pub data_set_writer_id: String,
    #[serde(default)]
    pub data_set_name: String,
    #[serde(default)]
    pub endpoint_id: String,
}

/// A group of data-set writers placed together onto one publisher
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterGroupInfo {
    pub writer_group_id: String,

    pub name: String,
    /// Site used to scope placement candidates
    #[serde(default)]
    pub site_id: String,

    #[serde(default)]
    pub state: WriterGroupState,

    /// Writers owned by this group, keyed by data set writer id
    #[serde(default)]
    pub writers: BTreeMap<String, DataSetWriterInfo>,

    /// Last reported placement connectivity
    #[serde(default)]
    pub connected: bool,
    /// Publisher the group was last activated on
    #[serde(default)]
    pub publisher_id: String,

    /// Credential provisioned for activation; absent until provisioning
    /// completes
    #[serde(default)]
    pub primary_key: Option<String>,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl WriterGroupInfo {
    /// Recompute the stable id from the identity-defining fields
    pub fn compute_id(&self) -> String {
        identity::writer_group_id(&self.site_id, &self.name)
    }

    /// Assign the computed id, returning self for chaining
    pub fn with_computed_id(mut self) -> Self {
        self.writer_group_id = self.compute_id();
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.state == WriterGroupState::Disabled
    }
}

impl Document for WriterGroupInfo {
    fn id(&self) -> String {
        self.writer_group_id.clone()
    }
}

/// Ephemeral activation input; never persisted as its own entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterGroupPlacement {
    pub writer_group_id: String,
    pub publisher_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_mapping() {
        assert_eq!(Visibility::of(None), Visibility::Deleted);
        assert_eq!(Visibility::of(Some(&None)), Visibility::Found);
        assert_eq!(
            Visibility::of(Some(&Some(Utc::now()))),
            Visibility::Lost
        );
    }

    #[test]
    fn test_application_scope_fallback() {
        let mut app = ApplicationInfo {
            application_uri: "opc.tcp://factory/line1".to_string(),
            ..Default::default()
        };
        assert_eq!(app.scope(), tungsten_common::DEFAULT_SCOPE);

        app.discoverer_id = "disc-1".to_string();
        assert_eq!(app.scope(), "disc-1");

        app.site_id = "site-1".to_string();
        assert_eq!(app.scope(), "site-1");
    }

    #[test]
    fn test_application_id_stable_under_uri_case() {
        let a = ApplicationInfo {
            site_id: "site-1".to_string(),
            application_uri: "opc.tcp://factory/line1".to_string(),
            ..Default::default()
        }
        .with_computed_id();
        let b = ApplicationInfo {
            site_id: "site-1".to_string(),
            application_uri: "OPC.TCP://FACTORY/LINE1".to_string(),
            ..Default::default()
        }
        .with_computed_id();
        assert_eq!(a.application_id, b.application_id);
    }

    #[test]
    fn test_endpoint_state_derivation() {
        let mut ep = EndpointInfo {
            activation_state: ActivationState::Deactivated,
            ..Default::default()
        };
        assert_eq!(
            ep.endpoint_state(ConnectionState::Connected),
            EndpointState::Disconnected
        );

        ep.activation_state = ActivationState::Activated;
        assert_eq!(
            ep.endpoint_state(ConnectionState::Disconnected),
            EndpointState::Connecting
        );
        assert_eq!(
            ep.endpoint_state(ConnectionState::Connected),
            EndpointState::Ready
        );

        ep.activation_state = ActivationState::ActivatedAndConnected;
        assert_eq!(
            ep.endpoint_state(ConnectionState::Disconnected),
            EndpointState::Ready
        );
    }

    #[test]
    fn test_writer_group_id_depends_on_identity() {
        let a = WriterGroupInfo {
            site_id: "site-1".to_string(),
            name: "line1-telemetry".to_string(),
            ..Default::default()
        }
        .with_computed_id();
        let b = WriterGroupInfo {
            site_id: "site-2".to_string(),
            name: "line1-telemetry".to_string(),
            ..Default::default()
        }
        .with_computed_id();
        assert_ne!(a.writer_group_id, b.writer_group_id);
    }

    #[test]
    fn test_serde_camel_case() {
        let app = ApplicationInfo {
            application_uri: "opc.tcp://x".to_string(),
            ..Default::default()
        }
        .with_computed_id();
        let json = serde_json::to_string(&app).unwrap();
        assert!(json.contains("\"applicationUri\""));
        assert!(json.contains("\"notSeenSince\""));
    }
}
