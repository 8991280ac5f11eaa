//! Writer-group placement
//!
//! Finds a live publisher for one writer group among the connected
//! gateways of its site. Candidates are shuffled - randomized load
//! spreading, no deterministic preference order - and tried sequentially;
//! the first successful activation wins so a group is never placed twice.
//! Placement never throws: any escaping error is logged and converted to
//! false, and the caller treats false as "retry next sweep".

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use tungsten_api::{WriterGroupInfo, WriterGroupPlacement};
use tungsten_common::{identity, Result};
use tungsten_registry::GatewayRegistry;
use tungsten_store::{DocumentStore, ShutdownSignal};

/// Activation interface to the publisher agent.
///
/// Errors mean "this candidate did not take the workload"; the engine
/// moves on to the next one.
#[async_trait]
pub trait WriterGroupActivator: Send + Sync {
    async fn activate(
        &self,
        placement: &WriterGroupPlacement,
        credential: &str,
    ) -> anyhow::Result<()>;
}

/// Places writer groups onto publishers in their site
pub struct PlacementEngine {
    groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
    gateways: Arc<GatewayRegistry>,
    activator: Arc<dyn WriterGroupActivator>,
    rng: Mutex<StdRng>,
}

impl PlacementEngine {
    pub fn new(
        groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
        gateways: Arc<GatewayRegistry>,
        activator: Arc<dyn WriterGroupActivator>,
    ) -> Self {
        Self {
            groups,
            gateways,
            activator,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic shuffling for tests
    pub fn with_seed(
        groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
        gateways: Arc<GatewayRegistry>,
        activator: Arc<dyn WriterGroupActivator>,
        seed: u64,
    ) -> Self {
        Self {
            groups,
            gateways,
            activator,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Try to place one writer group. True means "nothing left to do":
    /// placed now, already placed, or disabled. False means the next
    /// sweep should try again.
    pub async fn place_writer_group(
        &self,
        writer_group_id: &str,
        signal: &ShutdownSignal,
    ) -> bool {
        match self.try_place(writer_group_id, signal).await {
            Ok(placed) => placed,
            Err(e) => {
                warn!("placement of writer group '{}' failed: {}", writer_group_id, e);
                false
            }
        }
    }

    async fn try_place(&self, writer_group_id: &str, signal: &ShutdownSignal) -> Result<bool> {
        let group = self.groups.find(writer_group_id).await?.value;

        if group.site_id.is_empty() {
            warn!(
                "writer group '{}' has no site and cannot be placed",
                writer_group_id
            );
            return Ok(false);
        }

        let Some(credential) = group.primary_key.clone() else {
            debug!(
                "writer group '{}' is not provisioned yet, skipping placement",
                writer_group_id
            );
            return Ok(false);
        };

        // Disabled: nothing to place
        if group.is_disabled() {
            return Ok(true);
        }

        // Already reporting connected: the status query is eventually
        // consistent, so trust it and avoid a duplicate placement.
        if group.connected {
            return Ok(true);
        }

        let mut candidates = self
            .gateways
            .connected_in_site(&group.site_id, signal)
            .await?;
        if candidates.is_empty() {
            warn!(
                "no connected gateways in site '{}' for writer group '{}'",
                group.site_id, writer_group_id
            );
            return Ok(false);
        }

        {
            let mut rng = self.rng.lock();
            candidates.shuffle(&mut *rng);
        }

        for gateway in candidates {
            let Some(module_id) = gateway.publisher_module_id.as_deref() else {
                debug!("gateway '{}' hosts no publisher, skipping", gateway.device_id);
                continue;
            };
            let placement = WriterGroupPlacement {
                writer_group_id: writer_group_id.to_string(),
                publisher_id: identity::agent_id("pub", &gateway.device_id, module_id),
            };
            match self.activator.activate(&placement, &credential).await {
                Ok(()) => {
                    info!(
                        "placed writer group '{}' on publisher '{}'",
                        writer_group_id, placement.publisher_id
                    );
                    return Ok(true);
                }
                Err(e) => {
                    // Expected under churn; the next candidate may take it
                    debug!(
                        "activation of '{}' on '{}' failed: {:#}",
                        writer_group_id, placement.publisher_id, e
                    );
                }
            }
        }

        Ok(false)
    }
}
