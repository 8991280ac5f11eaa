//! Agent registrations
//!
//! Gateway modules (publisher, supervisor, discoverer) register with the
//! platform keyed by their (device id, module id) pair. Each registration
//! carries a desired/observed duality: desired holds requested
//! configuration, observed holds the last agent-reported truth. The two are
//! merged by a pure function and compared to surface whether the agent has
//! caught up with its requested configuration.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::OperationContext;
use tungsten_common::identity;
use tungsten_store::Document;

/// Agent log verbosity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Information,
    Debug,
    Verbose,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Error => "Error",
            LogLevel::Warning => "Warning",
            LogLevel::Information => "Information",
            LogLevel::Debug => "Debug",
            LogLevel::Verbose => "Verbose",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Error" => Ok(LogLevel::Error),
            "Warning" => Ok(LogLevel::Warning),
            "Information" => Ok(LogLevel::Information),
            "Debug" => Ok(LogLevel::Debug),
            "Verbose" => Ok(LogLevel::Verbose),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

/// Requested agent configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDesiredState {
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
}

/// Last agent-reported configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentObservedState {
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
}

/// Consolidated view after merging observed over desired
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub log_level: LogLevel,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub site_id: String,
}

impl AgentObservedState {
    /// Merge with the desired state. An observed value wins; where observed
    /// is absent the desired value passes through.
    pub fn merge(&self, desired: &AgentDesiredState) -> AgentState {
        AgentState {
            log_level: self
                .log_level
                .or(desired.log_level)
                .unwrap_or_default(),
            endpoint_url: self
                .endpoint_url
                .clone()
                .or_else(|| desired.endpoint_url.clone())
                .unwrap_or_default(),
            site_id: self
                .site_id
                .clone()
                .or_else(|| desired.site_id.clone())
                .unwrap_or_default(),
        }
    }

    /// Whether the agent has reported every requested value back.
    ///
    /// Only fields the desired side actually sets are compared; an unset
    /// desired field places no requirement on the agent.
    pub fn is_in_sync(&self, desired: &AgentDesiredState) -> bool {
        let log_level_synced = match desired.log_level {
            Some(want) => self.log_level == Some(want),
            None => true,
        };
        let endpoint_synced = match &desired.endpoint_url {
            Some(want) => self.endpoint_url.as_deref() == Some(want.as_str()),
            None => true,
        };
        let site_synced = match &desired.site_id {
            Some(want) => self.site_id.as_deref() == Some(want.as_str()),
            None => true,
        };
        log_level_synced && endpoint_synced && site_synced
    }
}

/// Publisher module registration - runs writer-group workloads
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherRegistration {
    pub publisher_id: String,
    pub device_id: String,
    pub module_id: String,

    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub desired: AgentDesiredState,
    #[serde(default)]
    pub observed: AgentObservedState,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl PublisherRegistration {
    pub fn compute_id(&self) -> String {
        identity::agent_id("pub", &self.device_id, &self.module_id)
    }

    pub fn with_computed_id(mut self) -> Self {
        self.publisher_id = self.compute_id();
        self
    }

    pub fn is_in_sync(&self) -> bool {
        self.observed.is_in_sync(&self.desired)
    }

    pub fn state(&self) -> AgentState {
        self.observed.merge(&self.desired)
    }
}

impl Document for PublisherRegistration {
    fn id(&self) -> String {
        self.publisher_id.clone()
    }
}

/// Supervisor module registration - owns endpoint connectivity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorRegistration {
    pub supervisor_id: String,
    pub device_id: String,
    pub module_id: String,

    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub desired: AgentDesiredState,
    #[serde(default)]
    pub observed: AgentObservedState,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl SupervisorRegistration {
    pub fn compute_id(&self) -> String {
        identity::agent_id("sup", &self.device_id, &self.module_id)
    }

    pub fn with_computed_id(mut self) -> Self {
        self.supervisor_id = self.compute_id();
        self
    }

    pub fn is_in_sync(&self) -> bool {
        self.observed.is_in_sync(&self.desired)
    }

    pub fn state(&self) -> AgentState {
        self.observed.merge(&self.desired)
    }
}

impl Document for SupervisorRegistration {
    fn id(&self) -> String {
        self.supervisor_id.clone()
    }
}

/// Discoverer module registration - scans networks and reports findings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscovererRegistration {
    pub discoverer_id: String,
    pub device_id: String,
    pub module_id: String,

    #[serde(default)]
    pub connected: bool,

    #[serde(default)]
    pub desired: AgentDesiredState,
    #[serde(default)]
    pub observed: AgentObservedState,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl DiscovererRegistration {
    pub fn compute_id(&self) -> String {
        identity::agent_id("disc", &self.device_id, &self.module_id)
    }

    pub fn with_computed_id(mut self) -> Self {
        self.discoverer_id = self.compute_id();
        self
    }

    pub fn is_in_sync(&self) -> bool {
        self.observed.is_in_sync(&self.desired)
    }

    pub fn state(&self) -> AgentState {
        self.observed.merge(&self.desired)
    }
}

impl Document for DiscovererRegistration {
    fn id(&self) -> String {
        self.discoverer_id.clone()
    }
}

/// Gateway device registration - the edge host agents run on.
///
/// Placement looks gateways up by site and follows `publisher_module_id`
/// to the publisher module hosted on the device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRegistration {
    pub gateway_id: String,
    pub device_id: String,

    #[serde(default)]
    pub site_id: String,
    #[serde(default)]
    pub connected: bool,

    /// Publisher module hosted on this gateway, if any
    #[serde(default)]
    pub publisher_module_id: Option<String>,

    #[serde(default)]
    pub not_seen_since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created: OperationContext,
    #[serde(default)]
    pub updated: OperationContext,
}

impl GatewayRegistration {
    pub fn compute_id(&self) -> String {
        identity::entity_id("gw", &[&self.device_id])
    }

    pub fn with_computed_id(mut self) -> Self {
        self.gateway_id = self.compute_id();
        self
    }
}

impl Document for GatewayRegistration {
    fn id(&self) -> String {
        self.gateway_id.clone()
    }
}
