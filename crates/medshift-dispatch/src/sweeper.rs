// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background expiry of open requests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use medshift_bus::{BusEvent, EventBus};
use medshift_config::model::DispatchConfig;
use medshift_core::{MarketplaceStore, MedshiftError, RequestStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Moves open requests past their expiry to `expired`.
///
/// Pending responses on an expired request are left as they are; the
/// request status alone makes them inert.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn MarketplaceStore>,
    bus: Arc<EventBus>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn MarketplaceStore>, bus: Arc<EventBus>, config: &DispatchConfig) -> Self {
        Self {
            store,
            bus,
            interval: Duration::from_secs(config.expiry_sweep_interval_secs.max(1)),
        }
    }

    pub async fn sweep_once(&self) -> Result<Vec<String>, MedshiftError> {
        self.sweep_at(Utc::now()).await
    }

    /// Expire everything past due at `now` and publish one update per request.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, MedshiftError> {
        let expired = self.store.expire_requests(now).await?;
        for id in &expired {
            let event = BusEvent::RequestUpdated {
                request_id: id.clone(),
                status: RequestStatus::Expired,
            };
            if let Err(e) = self.bus.publish(&event) {
                warn!(request_id = %id, error = %e, "expiry event rejected");
            }
        }
        if expired.is_empty() {
            debug!("expiry sweep found nothing");
        } else {
            info!(count = expired.len(), "expired open requests");
        }
        Ok(expired)
    }

    /// Sweep on every interval tick, starting immediately, until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "expiry sweep failed");
                    }
                }
            }
        }
        info!("expiry sweeper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
