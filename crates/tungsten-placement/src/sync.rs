//! Placement sweep job
//!
//! Runs under a sync host: each pass queries the writer groups that are
//! neither disabled nor connected and offers each to the placement
//! engine. A group that fails to place simply waits for the next tick;
//! starvation is bounded by the sweep interval and candidate churn.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use tungsten_api::WriterGroupInfo;
use tungsten_core::SyncJob;
use tungsten_store::{query_all, DocumentStore, ShutdownSignal, DEFAULT_PAGE_SIZE};

use crate::engine::PlacementEngine;

/// Periodic sweep over unplaced writer groups
pub struct WriterGroupSync {
    groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
    engine: Arc<PlacementEngine>,
    page_size: usize,
}

impl WriterGroupSync {
    pub fn new(
        groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
        engine: Arc<PlacementEngine>,
    ) -> Self {
        Self {
            groups,
            engine,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[async_trait]
impl SyncJob for WriterGroupSync {
    fn name(&self) -> &str {
        "writer-group-placement"
    }

    async fn run_once(&self, signal: &ShutdownSignal) -> anyhow::Result<()> {
        let pending = query_all(
            self.groups.as_ref(),
            &|g: &WriterGroupInfo| !g.is_disabled() && !g.connected,
            signal,
            self.page_size,
        )
        .await?;

        if pending.is_empty() {
            return Ok(());
        }

        let mut placed = 0;
        let mut deferred = 0;
        for group in pending {
            signal.check()?;
            if self
                .engine
                .place_writer_group(&group.value.writer_group_id, signal)
                .await
            {
                placed += 1;
            } else {
                deferred += 1;
            }
        }

        info!(
            "placement sweep finished: placed {}, deferred {}",
            placed, deferred
        );
        Ok(())
    }
}
