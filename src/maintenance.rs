//! Periodic maintenance: rebuild the index from disk and prune decayed
//! entries.
//!
//! The task waits a full interval *after* a pass returns before starting the
//! next one, so a slow pass can never overlap the following pass. Each pass
//! holds the same lock as the request handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::storage::Store;

/// Time between the end of one maintenance pass and the start of the next.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Self-rescheduling maintenance task.
pub struct Maintainer {
    interval: Duration,
}

impl Maintainer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run until `shutdown_rx` flips to `true`.
    ///
    /// The caller is expected to have run the startup pass already; this
    /// loop sleeps first, then refreshes under the store lock.
    pub async fn run(self, store: Arc<Mutex<Store>>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("maintenance task shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            if *shutdown_rx.borrow() {
                return;
            }

            let mut store = store.lock().await;
            info!("running maintenance pass");
            if let Err(err) = store.refresh(Local::now().naive_local()) {
                warn!(error = %err, "maintenance pass failed");
            }
        }
    }
}
