//! Background maintenance loop
//!
//! Runs [`Controller::tick`] on a fixed interval until shutdown is signalled.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::ServicesConfig;
use crate::controller::Controller;

pub struct MaintenanceService {
    controller: Arc<Controller>,
    tick_interval: Duration,
}

impl MaintenanceService {
    pub fn new(controller: Arc<Controller>, config: &ServicesConfig) -> Self {
        Self {
            controller,
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
        }
    }

    /// Spawn the loop. It exits once `shutdown` flips to `true` or its sender
    /// is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Maintenance service started (every {} ms)",
                self.tick_interval.as_millis()
            );
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let summary = self.controller.tick(Utc::now()).await;
                        if summary.is_idle() {
                            debug!("Maintenance tick: nothing to do");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Maintenance service stopped");
        })
    }
}
