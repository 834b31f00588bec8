// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `medshift serve` command implementation.
//!
//! Opens the store and starts the expiry sweeper. When a realtime URL is
//! configured it also holds a realtime session that receives pushed
//! changes and presence onto the local bus. Runs until SIGINT or SIGTERM.

use std::sync::Arc;

use medshift_bus::EventBus;
use medshift_config::model::MedshiftConfig;
use medshift_core::{MarketplaceStore, MedshiftError, RecipientRole};
use medshift_dispatch::ExpirySweeper;
use medshift_realtime::WsTransport;
use medshift_resilience::{ConnectionManager, Identity};
use medshift_storage::SqliteStore;
use tracing::{info, warn};

use crate::shutdown;

/// Open and migrate the configured database.
pub async fn open_store(config: &MedshiftConfig) -> Result<Arc<dyn MarketplaceStore>, MedshiftError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    Ok(Arc::new(store))
}

/// Start the realtime session, or return `None` when live delivery is off.
async fn start_realtime(
    config: &MedshiftConfig,
    bus: Arc<EventBus>,
) -> Result<Option<ConnectionManager>, MedshiftError> {
    if config.realtime.url.is_none() {
        info!("realtime.url not set, live delivery disabled");
        return Ok(None);
    }
    let transport = Arc::new(WsTransport::from_config(&config.realtime)?);
    let manager = ConnectionManager::new(transport, bus, &config.realtime);
    manager
        .initialize(Identity::new(
            config.service.name.clone(),
            RecipientRole::Requester,
        ))
        .await?;
    Ok(Some(manager))
}

pub async fn run_serve(config: MedshiftConfig) -> Result<(), MedshiftError> {
    info!(
        name = %config.service.name,
        database = %config.storage.database_path,
        "starting medshift"
    );
    let store = open_store(&config).await?;
    let bus = Arc::new(EventBus::new());
    let cancel = shutdown::install_signal_handler();

    let sweeper = ExpirySweeper::new(store.clone(), bus.clone(), &config.dispatch)
        .spawn(cancel.child_token());
    let realtime = start_realtime(&config, bus.clone()).await?;

    cancel.cancelled().await;
    info!("shutting down");

    if let Some(manager) = realtime
        && let Err(e) = manager.disconnect().await
    {
        warn!(error = %e, "realtime disconnect failed");
    }
    if let Err(e) = sweeper.await {
        warn!(error = %e, "expiry sweeper task ended abnormally");
    }
    bus.clear();
    store.close().await?;
    info!("medshift stopped");
    Ok(())
}
