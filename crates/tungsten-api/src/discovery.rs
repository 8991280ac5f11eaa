//! Discovery input contract
//!
//! A discoverer reports a batch of application/endpoint pairs. The context
//! decides whether absence implies removal: in register-only mode the batch
//! only adds and updates, used for bulk imports where a missing record does
//! not mean the device disappeared.

use serde::{Deserialize, Serialize};

use crate::model::{ApplicationInfo, EndpointInfo, OperationContext};

/// How a discovery batch is applied
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryContext {
    /// Suppress marking missing records as lost; add/update only
    #[serde(default)]
    pub register_only: bool,

    pub context: OperationContext,
}

impl DiscoveryContext {
    pub fn new(authority_id: &str) -> Self {
        Self {
            register_only: false,
            context: OperationContext::new(authority_id),
        }
    }

    pub fn register_only(authority_id: &str) -> Self {
        Self {
            register_only: true,
            context: OperationContext::new(authority_id),
        }
    }
}

/// One discovered application and the endpoints found on it
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub application: ApplicationInfo,
    #[serde(default)]
    pub endpoints: Vec<EndpointInfo>,
}
