// Written by Paul Clevett
// (C)Copyright Wolf Software Systems Ltd
// https://wolf.uk.com

//! Recurring background refresh of the cluster snapshot

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::ClusterCache;

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl ClusterCache {
    /// Refresh the snapshot every `interval`, quietly and ignoring the
    /// staleness window. Any previous refresh task is cancelled first, so at
    /// most one runs per cache. A tick is skipped while any fetch is still in
    /// flight. Must be called from within a Tokio runtime.
    pub fn start_background_refresh(self: &Arc<Self>, interval: Duration) {
        let requested = interval;
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        if interval != requested {
            warn!("Refresh interval {:?} out of range, using {:?}", requested, interval);
        }
        let mut poller = self.poller.lock();
        if let Some(previous) = poller.take() {
            previous.abort();
            debug!("Replaced existing background refresh");
        }

        // Weak, so a forgotten cache is not kept alive by its own timer
        let cache = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let start = Instant::now().checked_add(interval).unwrap_or_else(Instant::now);
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                if cache.is_fetching() {
                    debug!("Previous cluster fetch still running, skipping tick");
                    continue;
                }
                let outcome = cache.fetch_cluster_data(true, true).await;
                debug!("Background cluster refresh: {:?}", outcome);
            }
        });
        *poller = Some(handle);
        info!("Background cluster refresh every {}s", interval.as_secs_f64());
    }

    /// Cancel the background refresh. Safe to call when none is running.
    pub fn stop_background_refresh(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
            info!("Background cluster refresh stopped");
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.poller.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Release the timer. Also done on drop.
    pub fn shutdown(&self) {
        self.stop_background_refresh();
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.abort();
        }
    }
}
