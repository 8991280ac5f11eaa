//! Cooperative shutdown signal
//!
//! Sweep loops hold a `ShutdownSignal` and check it at every page-fetch
//! boundary; cancellation mid-batch leaves already-committed per-item
//! mutations in place.

use tokio::sync::watch;

use tungsten_common::{RegistryError, Result};

/// Sending half; dropping it does NOT cancel - call `shutdown`
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signal all holders of the paired `ShutdownSignal`
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, cheap to clone into each sweep loop
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    /// Keeps the channel open for signals not tied to a handle
    _keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl ShutdownSignal {
    /// A signal that never fires, for tests and standalone sweeps
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(std::sync::Arc::new(tx)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Bail out with `Cancelled` if shutdown was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RegistryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until shutdown is requested
    pub async fn cancelled(&mut self) {
        // An error means the sender was dropped without signalling; treat
        // that as cancellation so loops cannot hang on a dead handle.
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a linked handle/signal pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownHandle { tx },
        ShutdownSignal {
            rx,
            _keepalive: None,
        },
    )
}
