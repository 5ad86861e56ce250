//! Background liveness pinger (§4.2). Each service gets one: a loop that
//! pings a health endpoint at a fixed cadence, plus an on-demand
//! `check_now()` any failed request can trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Notify;

const PING_INTERVAL: Duration = Duration::from_secs(10);

/// Shared liveness flag for one service, cheap to clone and check from any
/// caller. `is_alive()` gates reads (§4.2); `check_now()` wakes the
/// background pinger to re-probe immediately instead of waiting out the
/// interval.
#[derive(Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Liveness {
    pub fn new() -> Liveness {
        Liveness {
            // Optimistic until the first probe says otherwise, so that a
            // server that starts up the instant before the gateway is
            // reachable doesn't spuriously fail every read.
            alive: Arc::new(AtomicBool::new(true)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn check_now(&self) {
        self.wake.notify_one();
    }

    fn set(&self, alive: bool, service: &str) {
        let was_alive = self.alive.swap(alive, Ordering::Relaxed);
        if was_alive != alive {
            if alive {
                info!("{service} liveness: now reachable");
            } else {
                warn!("{service} liveness: now unreachable");
            }
        }
    }
}

impl Default for Liveness {
    fn default() -> Liveness {
        Liveness::new()
    }
}

/// Spawn the background pinger task for one service. `ping_url` is probed
/// on a timer and whenever `liveness.check_now()` is called.
pub fn spawn(http: reqwest::Client, ping_url: String, liveness: Liveness) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = liveness.wake.notified() => {}
            }

            let reachable = match http.get(&ping_url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            };
            liveness.set(reachable, &ping_url);
        }
    });
}
