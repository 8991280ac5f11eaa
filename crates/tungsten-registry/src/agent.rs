//! Agent registries
//!
//! Publisher, supervisor, and discoverer modules share one registration
//! shape: reported upserts from the agent side, desired-config updates
//! from the operator side, and an in-sync flag computed from the two.
//! Gateways are plainer device records with the site-scoped connectivity
//! query placement depends on.

use std::sync::Arc;

use tracing::info;

use tungsten_api::{
    AgentDesiredState, AgentObservedState, DiscovererRegistration, GatewayRegistration,
    LogLevel, OperationContext, PublisherRegistration, SupervisorRegistration,
};
use tungsten_common::{RegistryError, Result};
use tungsten_core::{EntityEvent, EventBus};
use tungsten_store::{
    add_or_update, query_all, update_with_retry, Document, DocumentStore, Page, ShutdownSignal,
    DEFAULT_PAGE_SIZE,
};

/// Access to the shared registration fields, so one registry
/// implementation serves every module kind
pub trait AgentRecord: Document {
    fn desired(&self) -> &AgentDesiredState;
    fn desired_mut(&mut self) -> &mut AgentDesiredState;
    fn observed(&self) -> &AgentObservedState;
    fn observed_mut(&mut self) -> &mut AgentObservedState;
    fn connected(&self) -> bool;
    fn set_connected(&mut self, connected: bool);
    fn set_updated(&mut self, context: &OperationContext);
}

macro_rules! impl_agent_record {
    ($type:ty) => {
        impl AgentRecord for $type {
            fn desired(&self) -> &AgentDesiredState {
                &self.desired
            }

            fn desired_mut(&mut self) -> &mut AgentDesiredState {
                &mut self.desired
            }

            fn observed(&self) -> &AgentObservedState {
                &self.observed
            }

            fn observed_mut(&mut self) -> &mut AgentObservedState {
                &mut self.observed
            }

            fn connected(&self) -> bool {
                self.connected
            }

            fn set_connected(&mut self, connected: bool) {
                self.connected = connected;
            }

            fn set_updated(&mut self, context: &OperationContext) {
                self.updated = context.clone();
            }
        }
    };
}

impl_agent_record!(PublisherRegistration);
impl_agent_record!(SupervisorRegistration);
impl_agent_record!(DiscovererRegistration);

/// Registry for one agent module kind
pub struct AgentRegistry<T: AgentRecord> {
    store: Arc<dyn DocumentStore<T>>,
    events: Arc<EventBus<T>>,
}

pub type PublisherRegistry = AgentRegistry<PublisherRegistration>;
pub type SupervisorRegistry = AgentRegistry<SupervisorRegistration>;
pub type DiscovererRegistry = AgentRegistry<DiscovererRegistration>;

impl<T: AgentRecord> AgentRegistry<T> {
    pub fn new(store: Arc<dyn DocumentStore<T>>, events: Arc<EventBus<T>>) -> Self {
        Self { store, events }
    }

    /// Upsert a registration from agent-reported state.
    ///
    /// The reported side overwrites observed fields and connectivity; the
    /// desired side is operator-owned and survives untouched.
    pub async fn register_reported(
        &self,
        reported: T,
        context: &OperationContext,
    ) -> Result<T> {
        let id = reported.id();
        let observed = reported.observed().clone();
        let connected = reported.connected();

        match self.store.add(reported.clone()).await {
            Ok(versioned) => {
                info!("registered agent '{}'", id);
                self.events
                    .publish(EntityEvent::new(versioned.value.clone(), context.clone()))
                    .await;
                Ok(versioned.value)
            }
            Err(RegistryError::ResourceConflict(_)) => {
                let mut changed = false;
                let versioned = update_with_retry(self.store.as_ref(), &id, |record| {
                    changed =
                        record.observed() != &observed || record.connected() != connected;
                    if changed {
                        *record.observed_mut() = observed.clone();
                        record.set_connected(connected);
                        record.set_updated(context);
                    }
                    Ok(changed)
                })
                .await?;
                if changed {
                    self.events
                        .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                        .await;
                }
                Ok(versioned.value)
            }
            Err(e) => Err(e),
        }
    }

    /// Request a new log level; the agent reports it back when applied
    pub async fn set_log_level(
        &self,
        agent_id: &str,
        log_level: LogLevel,
        context: &OperationContext,
    ) -> Result<T> {
        let mut changed = false;
        let versioned = update_with_retry(self.store.as_ref(), agent_id, |record| {
            changed = record.desired().log_level != Some(log_level);
            if changed {
                record.desired_mut().log_level = Some(log_level);
                record.set_updated(context);
            }
            Ok(changed)
        })
        .await?;
        if changed {
            info!("requested log level {} for agent '{}'", log_level, agent_id);
            self.events
                .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                .await;
        }
        Ok(versioned.value)
    }

    pub async fn get(&self, agent_id: &str) -> Result<T> {
        Ok(self.store.find(agent_id).await?.value)
    }

    pub async fn list(&self, continuation: Option<&str>, page_size: usize) -> Result<Page<T>> {
        self.store.query(&|_| true, continuation, page_size).await
    }
}

/// Registry for gateway devices
pub struct GatewayRegistry {
    store: Arc<dyn DocumentStore<GatewayRegistration>>,
    page_size: usize,
}

impl GatewayRegistry {
    pub fn new(store: Arc<dyn DocumentStore<GatewayRegistration>>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Upsert a gateway from its reported device state
    pub async fn register_reported(
        &self,
        reported: GatewayRegistration,
        context: &OperationContext,
    ) -> Result<GatewayRegistration> {
        if reported.device_id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "gateway device id must not be empty".to_string(),
            ));
        }
        let reported = reported.with_computed_id();
        let id = reported.gateway_id.clone();

        let versioned = add_or_update(
            self.store.as_ref(),
            &id,
            || reported.clone(),
            |record| {
                let changed = record.site_id != reported.site_id
                    || record.connected != reported.connected
                    || record.publisher_module_id != reported.publisher_module_id;
                if changed {
                    record.site_id = reported.site_id.clone();
                    record.connected = reported.connected;
                    record.publisher_module_id = reported.publisher_module_id.clone();
                    record.updated = context.clone();
                }
                Ok(changed)
            },
        )
        .await?;
        Ok(versioned.value)
    }

    pub async fn get(&self, gateway_id: &str) -> Result<GatewayRegistration> {
        Ok(self.store.find(gateway_id).await?.value)
    }

    /// All connected gateways in one site - the placement candidate pool
    pub async fn connected_in_site(
        &self,
        site_id: &str,
        signal: &ShutdownSignal,
    ) -> Result<Vec<GatewayRegistration>> {
        let site = site_id.to_string();
        let items = query_all(
            self.store.as_ref(),
            &move |g: &GatewayRegistration| g.connected && g.site_id == site,
            signal,
            self.page_size,
        )
        .await?;
        Ok(items.into_iter().map(|v| v.value).collect())
    }
}
