//! Background price refresh service
//!
//! This service runs periodically to force-refresh a fixed set of pairs so
//! the cache stays warm. API endpoints still fetch on a miss; the refresher
//! only makes that rare.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::price_lookup::LtpService;
use super::price_provider::MarketDataProvider;
use super::quote::Pair;

/// Handle to the background refresh loop
///
/// Dropping the handle also ends the loop at its next wake-up.
pub struct PriceRefresher {
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PriceRefresher {
    /// Spawn the refresh loop
    ///
    /// The first refresh happens one `interval` after start, then every
    /// `interval`. A refresh round that is still running delays the next tick
    /// instead of overlapping it.
    pub fn start<P: MarketDataProvider + 'static>(
        service: Arc<LtpService<P>>,
        pairs: Vec<Pair>,
        interval: Duration,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        log::info!(
            "Starting background price refresh (interval: {:?}, pairs: {})",
            interval,
            pairs.len()
        );

        let handle = tokio::spawn(run_refresh_loop(service, pairs, interval, shutdown_rx));

        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal the loop to exit. Safe to call more than once.
    pub fn stop(&self) {
        let was_stopped = self.shutdown.send_replace(true);
        if !was_stopped {
            log::info!("Stopping background price refresh");
        }
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(&self) {
        self.stop();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("Price refresh task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}

async fn run_refresh_loop<P: MarketDataProvider + 'static>(
    service: Arc<LtpService<P>>,
    pairs: Vec<Pair>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        // A stop during a slow round abandons the round
        tokio::select! {
            _ = service.refresh_pairs(&pairs) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("Background price refresh stopped");
}
