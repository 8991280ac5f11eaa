//! Endpoint registry
//!
//! Endpoints are children of applications and mostly maintained by the
//! application registry's discovery reconciliation. This registry adds the
//! caller-facing operations: activation control and lookups. Activation
//! state is operator-owned and must survive every discovery patch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use tungsten_api::{ActivationState, EndpointInfo, OperationContext};
use tungsten_common::{RegistryError, Result};
use tungsten_core::{EntityEvent, EventBus};
use tungsten_store::{
    query_all, update_with_retry, DocumentStore, Page, ShutdownSignal, DEFAULT_PAGE_SIZE,
};

use crate::reconcile::Reconcilable;

impl Reconcilable for EndpointInfo {
    fn logical_key(&self) -> String {
        self.compute_id()
    }

    fn patch_from(&mut self, found: &Self, context: &OperationContext) -> bool {
        let mut patched = found.clone();
        patched.endpoint_id = self.endpoint_id.clone();
        // Operator-owned; not part of discovered data
        patched.activation_state = self.activation_state;
        patched.not_seen_since = None;
        patched.created = self.created.clone();
        patched.updated = self.updated.clone();

        let changed = patched != *self;
        if changed {
            patched.updated = context.clone();
            *self = patched;
        }
        changed
    }

    fn mark_lost(&mut self, now: DateTime<Utc>, context: &OperationContext) -> bool {
        if self.not_seen_since.is_some() {
            return false;
        }
        self.not_seen_since = Some(now);
        self.updated = context.clone();
        true
    }

    fn is_lost(&self) -> bool {
        self.not_seen_since.is_some()
    }
}

/// Normalize a discovered endpoint for reconciliation: parent it, clear
/// visibility, stamp the audit contexts, and derive its id.
pub(crate) fn prepare_found_endpoint(
    mut endpoint: EndpointInfo,
    application_id: &str,
    context: &OperationContext,
) -> EndpointInfo {
    endpoint.application_id = application_id.to_string();
    endpoint.not_seen_since = None;
    endpoint.created = context.clone();
    endpoint.updated = context.clone();
    endpoint.with_computed_id()
}

/// Registry for endpoint lookups and activation control
pub struct EndpointRegistry {
    endpoints: Arc<dyn DocumentStore<EndpointInfo>>,
    events: Arc<EventBus<EndpointInfo>>,
    page_size: usize,
}

impl EndpointRegistry {
    pub fn new(
        endpoints: Arc<dyn DocumentStore<EndpointInfo>>,
        events: Arc<EventBus<EndpointInfo>>,
    ) -> Self {
        Self {
            endpoints,
            events,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub async fn get_endpoint(&self, endpoint_id: &str) -> Result<EndpointInfo> {
        Ok(self.endpoints.find(endpoint_id).await?.value)
    }

    pub async fn list_endpoints(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<Page<EndpointInfo>> {
        self.endpoints.query(&|_| true, continuation, page_size).await
    }

    pub async fn list_by_application(
        &self,
        application_id: &str,
        signal: &ShutdownSignal,
    ) -> Result<Vec<EndpointInfo>> {
        let scope = application_id.to_string();
        let items = query_all(
            self.endpoints.as_ref(),
            &move |e: &EndpointInfo| e.application_id == scope,
            signal,
            self.page_size,
        )
        .await?;
        Ok(items.into_iter().map(|v| v.value).collect())
    }

    /// Request activation of an endpoint. A no-op when already activated;
    /// rejected while the endpoint is lost.
    pub async fn activate(
        &self,
        endpoint_id: &str,
        context: &OperationContext,
    ) -> Result<EndpointInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.endpoints.as_ref(), endpoint_id, |endpoint| {
            if endpoint.is_lost() {
                return Err(RegistryError::InvalidState(format!(
                    "endpoint '{}' is lost and cannot be activated",
                    endpoint_id
                )));
            }
            changed = endpoint.activation_state == ActivationState::Deactivated;
            if changed {
                endpoint.activation_state = ActivationState::Activated;
                endpoint.updated = context.clone();
            }
            Ok(changed)
        })
        .await?;
        if changed {
            info!("activated endpoint '{}'", endpoint_id);
            self.events
                .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                .await;
        }
        Ok(versioned.value)
    }

    /// Deactivate an endpoint; a no-op when already deactivated
    pub async fn deactivate(
        &self,
        endpoint_id: &str,
        context: &OperationContext,
    ) -> Result<EndpointInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.endpoints.as_ref(), endpoint_id, |endpoint| {
            changed = endpoint.activation_state != ActivationState::Deactivated;
            if changed {
                endpoint.activation_state = ActivationState::Deactivated;
                endpoint.updated = context.clone();
            }
            Ok(changed)
        })
        .await?;
        if changed {
            info!("deactivated endpoint '{}'", endpoint_id);
            self.events
                .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                .await;
        }
        Ok(versioned.value)
    }

    /// Record a supervisor's report that the endpoint session is up
    pub async fn mark_connected(
        &self,
        endpoint_id: &str,
        context: &OperationContext,
    ) -> Result<EndpointInfo> {
        let versioned = update_with_retry(self.endpoints.as_ref(), endpoint_id, |endpoint| {
            if endpoint.activation_state != ActivationState::Activated {
                return Ok(false);
            }
            endpoint.activation_state = ActivationState::ActivatedAndConnected;
            endpoint.updated = context.clone();
            Ok(true)
        })
        .await?;
        Ok(versioned.value)
    }

    /// Record a supervisor's report that the endpoint session dropped
    pub async fn mark_disconnected(
        &self,
        endpoint_id: &str,
        context: &OperationContext,
    ) -> Result<EndpointInfo> {
        let versioned = update_with_retry(self.endpoints.as_ref(), endpoint_id, |endpoint| {
            if endpoint.activation_state != ActivationState::ActivatedAndConnected {
                return Ok(false);
            }
            endpoint.activation_state = ActivationState::Activated;
            endpoint.updated = context.clone();
            Ok(true)
        })
        .await?;
        Ok(versioned.value)
    }
}
