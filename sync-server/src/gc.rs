//! Periodic garbage collection of the action log.
//!
//! Opportunistic collection already runs after every mutation batch; this
//! task is the backstop that reclaims entries whose last reason was
//! removed while no mutations were flowing.

use crate::config::GcConfig;
use crate::server::SyncServer;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::interval;

/// Spawn the periodic collection task.
///
/// The task holds only a weak reference and stops by itself once the
/// server is gone; `destroy()` aborts it earlier.
pub fn spawn_gc_task(server: Weak<SyncServer>, config: GcConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("gc task disabled");
            return;
        }

        tracing::info!("gc task started (interval: {}s)", config.interval_secs);
        let mut timer = interval(Duration::from_secs(config.interval_secs.max(1)));
        // The first tick fires immediately; opportunistic collection
        // already covered startup, so skip it.
        timer.tick().await;

        loop {
            timer.tick().await;
            let Some(server) = server.upgrade() else {
                break;
            };
            let removed = server.collect_garbage().await;
            if removed > 0 {
                tracing::debug!("gc: removed {} actions", removed);
            }
        }
    })
}
