//! Writer group registry
//!
//! Writer groups are operator-defined workloads, not discovery output:
//! they are created and deleted directly, own their writers as a marker
//! map on the group record, and carry the reported placement connectivity
//! the placement engine keys off.

use std::sync::Arc;

use tracing::info;

use tungsten_api::{DataSetWriterInfo, OperationContext, WriterGroupInfo, WriterGroupState};
use tungsten_common::{RegistryError, Result};
use tungsten_core::{EntityEvent, EventBus};
use tungsten_store::{update_with_retry, DocumentStore, Page};

/// Registry for writer groups and their writer markers
pub struct WriterGroupRegistry {
    groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
    events: Arc<EventBus<WriterGroupInfo>>,
}

impl WriterGroupRegistry {
    pub fn new(
        groups: Arc<dyn DocumentStore<WriterGroupInfo>>,
        events: Arc<EventBus<WriterGroupInfo>>,
    ) -> Self {
        Self { groups, events }
    }

    /// Create a writer group; `ResourceConflict` if the identity exists
    pub async fn create(
        &self,
        group: WriterGroupInfo,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        if group.name.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "writer group name must not be empty".to_string(),
            ));
        }

        let mut group = group;
        group.connected = false;
        group.publisher_id = String::new();
        group.created = context.clone();
        group.updated = context.clone();
        let group = group.with_computed_id();

        let versioned = self.groups.add(group).await?;
        info!("created writer group '{}'", versioned.value.writer_group_id);
        self.events
            .publish(EntityEvent::new(versioned.value.clone(), context.clone()))
            .await;
        Ok(versioned.value)
    }

    pub async fn get_writer_group(&self, writer_group_id: &str) -> Result<WriterGroupInfo> {
        Ok(self.groups.find(writer_group_id).await?.value)
    }

    pub async fn list_writer_groups(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<Page<WriterGroupInfo>> {
        self.groups.query(&|_| true, continuation, page_size).await
    }

    pub async fn delete(
        &self,
        writer_group_id: &str,
        context: &OperationContext,
    ) -> Result<()> {
        let removed = self.groups.remove(writer_group_id, None).await?;
        info!("deleted writer group '{}'", writer_group_id);
        self.events
            .publish(EntityEvent::deleted(removed, context.clone()))
            .await;
        Ok(())
    }

    /// Add or replace a writer marker on the group
    pub async fn add_writer(
        &self,
        writer_group_id: &str,
        writer: DataSetWriterInfo,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        if writer.data_set_writer_id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "data set writer id must not be empty".to_string(),
            ));
        }
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            let slot = group.writers.get(&writer.data_set_writer_id);
            changed = slot != Some(&writer);
            if changed {
                group
                    .writers
                    .insert(writer.data_set_writer_id.clone(), writer.clone());
                group.updated = context.clone();
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

    /// Remove a writer marker; a no-op when the writer is absent
    pub async fn remove_writer(
        &self,
        writer_group_id: &str,
        data_set_writer_id: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            changed = group.writers.remove(data_set_writer_id).is_some();
            if changed {
                group.updated = context.clone();
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

    /// Record a successful activation reported back by the publisher
    pub async fn mark_connected(
        &self,
        writer_group_id: &str,
        publisher_id: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            changed = !group.connected
                || group.publisher_id != publisher_id
                || group.state != WriterGroupState::Publishing;
            if changed {
                group.connected = true;
                group.publisher_id = publisher_id.to_string();
                if group.state != WriterGroupState::Disabled {
                    group.state = WriterGroupState::Publishing;
                }
                group.updated = context.clone();
            }
            Ok(changed)
        })
        .await?;
        if changed {
            info!(
                "writer group '{}' connected on publisher '{}'",
                writer_group_id, publisher_id
            );
            self.events
                .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                .await;
        }
        Ok(versioned.value)
    }

    /// Record that the placement dropped; the next orchestration sweep
    /// will try to place the group again
    pub async fn mark_disconnected(
        &self,
        writer_group_id: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            changed = group.connected || !group.publisher_id.is_empty();
            if changed {
                group.connected = false;
                group.publisher_id = String::new();
                if group.state == WriterGroupState::Publishing {
                    group.state = WriterGroupState::Pending;
                }
                group.updated = context.clone();
            }
            Ok(changed)
        })
        .await?;
        if changed {
            info!("writer group '{}' disconnected", writer_group_id);
            self.events
                .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                .await;
        }
        Ok(versioned.value)
    }

    /// Disable the group; placement treats a disabled group as nothing to do
    pub async fn disable(
        &self,
        writer_group_id: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            changed = group.state != WriterGroupState::Disabled;
            if changed {
                group.state = WriterGroupState::Disabled;
                group.updated = context.clone();
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

    /// Re-enable a disabled group for placement
    pub async fn enable(
        &self,
        writer_group_id: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let mut changed = false;
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            changed = group.state == WriterGroupState::Disabled;
            if changed {
                group.state = if group.connected {
                    WriterGroupState::Publishing
                } else {
                    WriterGroupState::Pending
                };
                group.updated = context.clone();
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

    /// Store the provisioned activation credential
    pub async fn set_primary_key(
        &self,
        writer_group_id: &str,
        primary_key: &str,
        context: &OperationContext,
    ) -> Result<WriterGroupInfo> {
        let versioned = update_with_retry(self.groups.as_ref(), writer_group_id, |group| {
            if group.primary_key.as_deref() == Some(primary_key) {
                return Ok(false);
            }
            group.primary_key = Some(primary_key.to_string());
            group.updated = context.clone();
            Ok(true)
        })
        .await?;
        Ok(versioned.value)
    }
}
