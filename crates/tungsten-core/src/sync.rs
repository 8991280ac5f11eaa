//! Periodic sync hosts
//!
//! A sync host wraps one long-lived background loop: wait the configured
//! interval, run one idempotent pass, repeat. Pass failures are logged and
//! never terminate the loop; the next tick self-heals. An external
//! config-change event can trigger a pass immediately without waiting for
//! the tick.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tungsten_common::{RegistryError, Result};
use tungsten_store::{shutdown_channel, ShutdownHandle, ShutdownSignal};

use crate::config::HostSchedule;

/// One idempotent reconciliation or placement pass
#[async_trait]
pub trait SyncJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run a single pass. The signal is checked at page boundaries inside
    /// the pass; cancellation mid-batch leaves committed items in place.
    async fn run_once(&self, signal: &ShutdownSignal) -> anyhow::Result<()>;
}

struct Running {
    handle: JoinHandle<()>,
    shutdown: ShutdownHandle,
    trigger: Arc<Notify>,
}

/// Timer-driven host for one sync job
pub struct SyncHost {
    job: Arc<dyn SyncJob>,
    schedule: HostSchedule,
    running: Mutex<Option<Running>>,
}

impl SyncHost {
    pub fn new(job: Arc<dyn SyncJob>, schedule: HostSchedule) -> Self {
        Self {
            job,
            schedule,
            running: Mutex::new(None),
        }
    }

    /// Start the background loop.
    ///
    /// Fails with `InvalidState` if the host is already running.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.running.lock();
        if guard.is_some() {
            return Err(RegistryError::InvalidState(format!(
                "sync host '{}' is already running",
                self.job.name()
            )));
        }

        let (shutdown, signal) = shutdown_channel();
        let trigger = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            self.job.clone(),
            self.schedule.clone(),
            signal,
            trigger.clone(),
        ));

        *guard = Some(Running {
            handle,
            shutdown,
            trigger,
        });
        Ok(())
    }

    /// Stop the background loop and wait for it to exit.
    ///
    /// A no-op when the host is not running.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(running) = running {
            running.shutdown.shutdown();
            let _ = running.handle.await;
        }
    }

    /// Reset the wait and run a pass immediately.
    ///
    /// Returns false when the host is not running.
    pub fn trigger_now(&self) -> bool {
        let guard = self.running.lock();
        match guard.as_ref() {
            Some(running) => {
                running.trigger.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

async fn run_loop(
    job: Arc<dyn SyncJob>,
    schedule: HostSchedule,
    mut signal: ShutdownSignal,
    trigger: Arc<Notify>,
) {
    info!(
        "sync host '{}' started with interval: {}s",
        job.name(),
        schedule.interval_secs
    );

    if let Some(delay) = schedule.initial_delay() {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = trigger.notified() => {
                debug!("sync host '{}' triggered during initial delay", job.name());
            }
            _ = signal.cancelled() => {
                info!("sync host '{}' stopped", job.name());
                return;
            }
        }
    }

    loop {
        if signal.is_cancelled() {
            break;
        }

        if let Err(e) = job.run_once(&signal).await {
            warn!("sync pass '{}' failed: {:#}", job.name(), e);
        }

        tokio::select! {
            _ = tokio::time::sleep(schedule.interval()) => {}
            _ = trigger.notified() => {
                debug!("sync host '{}' triggered, running pass now", job.name());
            }
            _ = signal.cancelled() => break,
        }
    }

    info!("sync host '{}' stopped", job.name());
}
