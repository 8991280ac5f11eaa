//! Discovery reconciliation
//!
//! Given the entities currently persisted for one scope and the entities a
//! discovery sweep just reported, partition them by logical key and drive
//! the store toward the reported truth:
//!
//! - present only in the store: mark lost (never hard-delete on a sweep)
//! - present in both: patch from the reported copy, mark found again
//! - present only in the sweep: create, falling back to a patch when a
//!   concurrent creator won the race
//!
//! The order is fixed so an item present in both sets is never first
//! marked lost and then recreated. Every item is processed on its own:
//! one failure is logged and counted, the rest of the batch continues.
//! Events fire after each committed mutation, best-effort.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tungsten_api::{DiscoveryContext, OperationContext};
use tungsten_common::{RegistryError, Result};
use tungsten_core::{EntityEvent, EventBus};
use tungsten_store::{update_with_retry, Document, DocumentStore};

/// An entity that can be diffed against a discovery sweep
pub trait Reconcilable: Document {
    /// Logical-equality key over identity-defining fields only.
    ///
    /// Volatile fields (timestamps, connection state) must never feed the
    /// key, or every sweep would see the whole scope as new.
    fn logical_key(&self) -> String;

    /// Patch this record from the reported copy: copy discovered fields,
    /// clear `not_seen_since`, keep caller-owned fields (activation state,
    /// audit trail) untouched. Returns false when nothing would change.
    fn patch_from(&mut self, found: &Self, context: &OperationContext) -> bool;

    /// Mark the record lost; false when it already is
    fn mark_lost(&mut self, now: DateTime<Utc>, context: &OperationContext) -> bool;

    fn is_lost(&self) -> bool;
}

/// Per-batch outcome counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub disabled: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn absorb(&mut self, other: ReconcileSummary) {
        self.added += other.added;
        self.updated += other.updated;
        self.disabled += other.disabled;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

impl Display for ReconcileSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "added: {}, updated: {}, disabled: {}, unchanged: {}, failed: {}",
            self.added, self.updated, self.disabled, self.unchanged, self.failed
        )
    }
}

/// Drives one entity kind's store toward a discovery sweep's view
pub struct Reconciler<T: Reconcilable> {
    store: Arc<dyn DocumentStore<T>>,
    events: Arc<EventBus<T>>,
}

impl<T: Reconcilable> Reconciler<T> {
    pub fn new(store: Arc<dyn DocumentStore<T>>, events: Arc<EventBus<T>>) -> Self {
        Self { store, events }
    }

    /// Reconcile one scope's existing entities against the reported set.
    ///
    /// `found` entities must arrive fully prepared: ids computed, audit
    /// contexts set, `not_seen_since` cleared.
    pub async fn reconcile(
        &self,
        existing: Vec<T>,
        found: Vec<T>,
        context: &DiscoveryContext,
    ) -> ReconcileSummary {
        let now = Utc::now();
        let mut summary = ReconcileSummary::default();

        let existing_by_key: BTreeMap<String, T> = existing
            .into_iter()
            .map(|item| (item.logical_key(), item))
            .collect();
        let found_by_key: BTreeMap<String, T> = found
            .into_iter()
            .map(|item| (item.logical_key(), item))
            .collect();

        // 1. In the store, absent from the sweep: mark lost. Register-only
        //    batches skip this step - absence does not imply removal there.
        if !context.register_only {
            for (key, item) in &existing_by_key {
                if found_by_key.contains_key(key) {
                    continue;
                }
                match self.mark_lost_one(item, now, context).await {
                    Ok(true) => summary.disabled += 1,
                    Ok(false) => summary.unchanged += 1,
                    Err(e) => {
                        warn!("failed to mark '{}' lost: {}", item.id(), e);
                        summary.failed += 1;
                    }
                }
            }
        }

        // 2. In both: patch the stored record from the reported copy
        for (key, found_item) in &found_by_key {
            let Some(existing_item) = existing_by_key.get(key) else {
                continue;
            };
            match self.patch_one(&existing_item.id(), found_item, context).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => summary.unchanged += 1,
                Err(e) => {
                    warn!("failed to patch '{}': {}", existing_item.id(), e);
                    summary.failed += 1;
                }
            }
        }

        // 3. Only in the sweep: create
        for (key, found_item) in &found_by_key {
            if existing_by_key.contains_key(key) {
                continue;
            }
            match self.add_one(found_item, context).await {
                Ok(outcome) => summary.absorb(outcome),
                Err(e) => {
                    warn!("failed to add '{}': {}", found_item.id(), e);
                    summary.failed += 1;
                }
            }
        }

        info!("reconciled scope: {}", summary);
        summary
    }

    async fn mark_lost_one(
        &self,
        item: &T,
        now: DateTime<Utc>,
        context: &DiscoveryContext,
    ) -> Result<bool> {
        let id = item.id();
        let mut marked = false;
        let result = update_with_retry(self.store.as_ref(), &id, |record| {
            marked = record.mark_lost(now, &context.context);
            Ok(marked)
        })
        .await;
        match result {
            Ok(versioned) => {
                if marked {
                    self.events
                        .publish(EntityEvent::updated(versioned.value, context.context.clone()))
                        .await;
                }
                Ok(marked)
            }
            // Hard-deleted concurrently; nothing left to mark
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn patch_one(
        &self,
        id: &str,
        found: &T,
        context: &DiscoveryContext,
    ) -> Result<bool> {
        let mut changed = false;
        let versioned = update_with_retry(self.store.as_ref(), id, |record| {
            changed = record.patch_from(found, &context.context);
            Ok(changed)
        })
        .await?;
        if changed {
            self.events
                .publish(EntityEvent::updated(versioned.value, context.context.clone()))
                .await;
        }
        Ok(changed)
    }

    async fn add_one(&self, found: &T, context: &DiscoveryContext) -> Result<ReconcileSummary> {
        let mut outcome = ReconcileSummary::default();
        match self.store.add(found.clone()).await {
            Ok(versioned) => {
                outcome.added = 1;
                self.events
                    .publish(EntityEvent::new(versioned.value, context.context.clone()))
                    .await;
            }
            Err(RegistryError::ResourceConflict(_)) => {
                // A concurrent creator won the race; patch the survivor
                // instead of failing the sweep.
                if self.patch_one(&found.id(), found, context).await? {
                    outcome.updated = 1;
                } else {
                    outcome.unchanged = 1;
                }
            }
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }
}
