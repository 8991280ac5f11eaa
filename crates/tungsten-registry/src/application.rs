//! Application registry
//!
//! Owns application records and their endpoint children. Discovery sweeps
//! flow through the reconciler; register/unregister are direct API calls
//! with synchronous validation and user-visible errors.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use url::Url;

use tungsten_api::{
    ApplicationInfo, ApplicationType, DiscoveryContext, DiscoveryResult, EndpointInfo,
    OperationContext,
};
use tungsten_common::{RegistryError, Result};
use tungsten_core::{EntityEvent, EventBus};
use tungsten_store::{
    query_all, update_with_retry, Document, DocumentStore, Page, ShutdownSignal, Versioned,
    DEFAULT_PAGE_SIZE, MAX_UPDATE_ATTEMPTS,
};

use crate::endpoint::prepare_found_endpoint;
use crate::reconcile::{Reconcilable, ReconcileSummary, Reconciler};

impl Reconcilable for ApplicationInfo {
    fn logical_key(&self) -> String {
        // Identity fields only; the derived id is exactly that
        self.compute_id()
    }

    fn patch_from(&mut self, found: &Self, context: &OperationContext) -> bool {
        let mut patched = found.clone();
        patched.application_id = self.application_id.clone();
        patched.not_seen_since = None;
        patched.created = self.created.clone();
        // Pin the audit context for the comparison; audit churn alone is
        // not a change worth writing.
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

/// Validate a directly registered or updated application.
///
/// Discovery batches skip this - they carry trusted data from the
/// discoverer, and a malformed record there is skipped per item instead.
fn validate_application(application: &ApplicationInfo) -> Result<()> {
    if Url::parse(&application.application_uri).is_err() {
        return Err(RegistryError::InvalidArgument(format!(
            "application uri '{}' is not an absolute uri",
            application.application_uri
        )));
    }
    if application.application_type == ApplicationType::Client {
        if !application.discovery_urls.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "a client application must not carry discovery urls".to_string(),
            ));
        }
    } else {
        if application.discovery_urls.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "a server application needs at least one discovery url".to_string(),
            ));
        }
        if application.capabilities.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "a server application needs at least one capability".to_string(),
            ));
        }
    }
    Ok(())
}

/// Combined outcome of one discovery batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub applications: ReconcileSummary,
    pub endpoints: ReconcileSummary,
}

impl Display for DiscoverySummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "applications: [{}], endpoints: [{}]",
            self.applications, self.endpoints
        )
    }
}

/// Registry for applications and their endpoint children
pub struct ApplicationRegistry {
    applications: Arc<dyn DocumentStore<ApplicationInfo>>,
    endpoints: Arc<dyn DocumentStore<EndpointInfo>>,
    application_events: Arc<EventBus<ApplicationInfo>>,
    endpoint_events: Arc<EventBus<EndpointInfo>>,
    page_size: usize,
}

impl ApplicationRegistry {
    pub fn new(
        applications: Arc<dyn DocumentStore<ApplicationInfo>>,
        endpoints: Arc<dyn DocumentStore<EndpointInfo>>,
        application_events: Arc<EventBus<ApplicationInfo>>,
        endpoint_events: Arc<EventBus<EndpointInfo>>,
    ) -> Self {
        Self {
            applications,
            endpoints,
            application_events,
            endpoint_events,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Process one discoverer's sweep: reconcile its applications, then
    /// each surviving application's endpoints.
    pub async fn process_discovery(
        &self,
        discoverer_id: &str,
        context: &DiscoveryContext,
        results: Vec<DiscoveryResult>,
        signal: &ShutdownSignal,
    ) -> Result<DiscoverySummary> {
        let mut found_applications: BTreeMap<String, ApplicationInfo> = BTreeMap::new();
        let mut found_endpoints: BTreeMap<String, Vec<EndpointInfo>> = BTreeMap::new();

        for result in results {
            let mut application = result.application;
            application.discoverer_id = discoverer_id.to_string();
            application.not_seen_since = None;
            application.created = context.context.clone();
            application.updated = context.context.clone();
            let application = application.with_computed_id();
            let application_id = application.application_id.clone();

            // An application reported without endpoints still reconciles
            // its children: the empty set marks them all lost.
            let endpoints = found_endpoints.entry(application_id.clone()).or_default();
            for endpoint in result.endpoints {
                endpoints.push(prepare_found_endpoint(
                    endpoint,
                    &application_id,
                    &context.context,
                ));
            }
            found_applications.insert(application_id, application);
        }

        let scope = discoverer_id.to_string();
        let existing = query_all(
            self.applications.as_ref(),
            &move |a: &ApplicationInfo| a.discoverer_id == scope,
            signal,
            self.page_size,
        )
        .await?;

        let application_reconciler =
            Reconciler::new(self.applications.clone(), self.application_events.clone());
        let applications = application_reconciler
            .reconcile(
                existing.into_iter().map(|v| v.value).collect(),
                found_applications.into_values().collect(),
                context,
            )
            .await;

        let endpoint_reconciler =
            Reconciler::new(self.endpoints.clone(), self.endpoint_events.clone());
        let mut endpoints = ReconcileSummary::default();
        for (application_id, found) in found_endpoints {
            signal.check()?;
            let scope = application_id.clone();
            let existing = query_all(
                self.endpoints.as_ref(),
                &move |e: &EndpointInfo| e.application_id == scope,
                signal,
                self.page_size,
            )
            .await?;
            endpoints.absorb(
                endpoint_reconciler
                    .reconcile(
                        existing.into_iter().map(|v| v.value).collect(),
                        found,
                        context,
                    )
                    .await,
            );
        }

        let summary = DiscoverySummary {
            applications,
            endpoints,
        };
        info!("processed discovery from '{}': {}", discoverer_id, summary);
        Ok(summary)
    }

    /// Register one application directly, reviving a lost record when the
    /// identity already exists.
    pub async fn register(
        &self,
        application: ApplicationInfo,
        context: &OperationContext,
    ) -> Result<ApplicationInfo> {
        validate_application(&application)?;

        let mut application = application;
        application.not_seen_since = None;
        application.created = context.clone();
        application.updated = context.clone();
        let application = application.with_computed_id();
        let id = application.application_id.clone();

        match self.applications.add(application.clone()).await {
            Ok(versioned) => {
                self.application_events
                    .publish(EntityEvent::new(versioned.value.clone(), context.clone()))
                    .await;
                Ok(versioned.value)
            }
            Err(RegistryError::ResourceConflict(_)) => {
                // Same identity already registered; patch and revive it
                let mut changed = false;
                let versioned =
                    update_with_retry(self.applications.as_ref(), &id, |record| {
                        changed = record.patch_from(&application, context);
                        Ok(changed)
                    })
                    .await?;
                if changed {
                    self.application_events
                        .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                        .await;
                }
                Ok(versioned.value)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_application(&self, application_id: &str) -> Result<ApplicationInfo> {
        Ok(self.applications.find(application_id).await?.value)
    }

    pub async fn list_applications(
        &self,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<Page<ApplicationInfo>> {
        self.applications
            .query(&|_| true, continuation, page_size)
            .await
    }

    /// Update one application under the bounded retry loop.
    ///
    /// The id is recomputed after the patch: a changed identity discards
    /// the old record's version token and goes through a fresh create so
    /// unrelated records are never silently merged.
    pub async fn update_application<F>(
        &self,
        application_id: &str,
        mut mutate: F,
        context: &OperationContext,
    ) -> Result<ApplicationInfo>
    where
        F: FnMut(&mut ApplicationInfo) -> Result<()> + Send,
    {
        let mut attempt = 1;
        loop {
            let current = self.applications.find(application_id).await?;
            let mut value = current.value.clone();
            mutate(&mut value)?;
            value.updated = context.clone();
            validate_application(&value)?;

            let computed = value.compute_id();
            if computed != application_id {
                value.application_id = computed;
                value.created = context.clone();
                let added = self.applications.add(value).await?;
                self.application_events
                    .publish(EntityEvent::new(added.value.clone(), context.clone()))
                    .await;

                // Retire the old identity; children re-home on the next
                // discovery sweep.
                let removed = self
                    .applications
                    .remove(application_id, Some(&current.generation))
                    .await?;
                self.application_events
                    .publish(EntityEvent::deleted(removed, context.clone()))
                    .await;
                return Ok(added.value);
            }

            match self
                .applications
                .replace(application_id, &current.generation, value)
                .await
            {
                Ok(versioned) => {
                    self.application_events
                        .publish(EntityEvent::updated(versioned.value.clone(), context.clone()))
                        .await;
                    return Ok(versioned.value);
                }
                Err(RegistryError::ResourceOutOfDate(_)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Hard-delete an application and all its endpoints.
    ///
    /// Children are deleted one by one, each with its own event. The
    /// first failing child aborts the call and propagates: an explicit
    /// delete is a direct user action that must not swallow a partial
    /// removal, unlike the per-item isolation of a sweep.
    pub async fn unregister(
        &self,
        application_id: &str,
        context: &OperationContext,
    ) -> Result<()> {
        let application = self.applications.find(application_id).await?.value;

        let scope = application_id.to_string();
        let children: Vec<Versioned<EndpointInfo>> = query_all(
            self.endpoints.as_ref(),
            &move |e: &EndpointInfo| e.application_id == scope,
            &ShutdownSignal::never(),
            self.page_size,
        )
        .await?;

        for child in children {
            let removed = self.endpoints.remove(&child.value.id(), None).await?;
            self.endpoint_events
                .publish(EntityEvent::deleted(removed, context.clone()))
                .await;
        }

        self.applications.remove(application_id, None).await?;
        self.application_events
            .publish(EntityEvent::deleted(application, context.clone()))
            .await;
        info!("unregistered application '{}'", application_id);
        Ok(())
    }

    /// Hard-delete applications lost since before the cutoff; the only
    /// hard-delete path besides explicit unregister.
    pub async fn purge_lost(
        &self,
        older_than: DateTime<Utc>,
        context: &OperationContext,
        signal: &ShutdownSignal,
    ) -> Result<usize> {
        let lost = query_all(
            self.applications.as_ref(),
            &move |a: &ApplicationInfo| {
                a.not_seen_since.map(|t| t < older_than).unwrap_or(false)
            },
            signal,
            self.page_size,
        )
        .await?;

        let mut purged = 0;
        for application in lost {
            signal.check()?;
            let id = application.value.id();
            match self.unregister(&id, context).await {
                Ok(()) => purged += 1,
                Err(e) => {
                    // Sweep semantics: skip and let the next pass retry
                    warn!("failed to purge application '{}': {}", id, e);
                }
            }
        }
        if purged > 0 {
            info!("purged {} lost applications", purged);
        }
        Ok(purged)
    }
}
