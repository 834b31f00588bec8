// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end marketplace scenarios.
//!
//! `TestHarness` assembles the dispatch stack with a temp SQLite database,
//! an event bus, and a [`MockTransport`]. Helpers cover the steps most
//! scenarios repeat: funding a requester, registering responders, posting
//! a request, and answering it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use medshift_bus::EventBus;
use medshift_config::model::{MedshiftConfig, StorageConfig};
use medshift_core::types::{
    GeoPoint, NewUrgentRequest, ResponderProfile, Response, ResponseSubmission, UrgentRequest,
};
use medshift_core::{MarketplaceStore, MedshiftError, RealtimeTransport, ResponseKind, Urgency};
use medshift_dispatch::{ExpirySweeper, RequestIntake, ResponseLifecycle};
use medshift_storage::SqliteStore;
use tokio::sync::mpsc;
use tracing::debug;

use crate::mock_transport::MockTransport;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MedshiftConfig,
    accounts: Vec<(String, u32)>,
    responders: Vec<ResponderProfile>,
    live_transport: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: MedshiftConfig::default(),
            accounts: Vec::new(),
            responders: Vec::new(),
            live_transport: false,
        }
    }

    /// Start from a custom configuration. Storage settings are replaced by
    /// the harness temp database.
    pub fn with_config(mut self, config: MedshiftConfig) -> Self {
        self.config = config;
        self
    }

    /// Open a credit account with `balance` for `requester_id`.
    pub fn with_account(mut self, requester_id: &str, balance: u32) -> Self {
        self.accounts.push((requester_id.to_string(), balance));
        self
    }

    /// Register an available responder near downtown Manhattan.
    pub fn with_responder(mut self, id: &str, specialty: &str) -> Self {
        self.responders.push(TestHarness::responder(id, specialty));
        self
    }

    pub fn with_profile(mut self, profile: ResponderProfile) -> Self {
        self.responders.push(profile);
        self
    }

    /// Connect the mock transport and attach it to the bus so notifications
    /// are also broadcast on targeted channels.
    pub fn with_live_transport(mut self) -> Self {
        self.live_transport = true;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, MedshiftError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MedshiftError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let store = SqliteStore::new(config.storage.clone());
        store.initialize().await?;
        let store: Arc<dyn MarketplaceStore> = Arc::new(store);

        for (requester_id, balance) in &self.accounts {
            store.open_credit_account(requester_id, *balance).await?;
        }
        for profile in &self.responders {
            store.upsert_responder(profile).await?;
        }

        let transport = Arc::new(MockTransport::new());
        let bus = Arc::new(EventBus::new());
        // Frames pushed by tests are not routed anywhere unless a test
        // drives a connection manager itself.
        let (frame_tx, frame_rx) = mpsc::channel(64);
        if self.live_transport {
            transport.connect(frame_tx).await?;
            bus.attach_transport(transport.clone());
        }

        let intake = RequestIntake::new(store.clone(), bus.clone(), &config);
        let lifecycle = ResponseLifecycle::new(
            store.clone(),
            bus.clone(),
            config.dispatch.notification_ttl_hours,
        );
        let sweeper = ExpirySweeper::new(store.clone(), bus.clone(), &config.dispatch);
        debug!(path = %db_path.display(), "test harness ready");

        Ok(TestHarness {
            store,
            bus,
            transport,
            intake,
            lifecycle,
            sweeper,
            config,
            _frames: frame_rx,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete dispatch environment over a temp database.
pub struct TestHarness {
    /// SQLite store (temp DB, cleaned up on drop).
    pub store: Arc<dyn MarketplaceStore>,
    pub bus: Arc<EventBus>,
    /// Realtime transport; connected only when built `with_live_transport`.
    pub transport: Arc<MockTransport>,
    pub intake: RequestIntake,
    pub lifecycle: ResponseLifecycle,
    pub sweeper: ExpirySweeper,
    /// Effective configuration, pointing at the temp database.
    pub config: MedshiftConfig,
    _frames: mpsc::Receiver<medshift_core::types::InboundFrame>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// An available responder profile with coordinates near downtown Manhattan.
    pub fn responder(id: &str, specialty: &str) -> ResponderProfile {
        ResponderProfile {
            id: id.to_string(),
            display_name: format!("Dr. {id}"),
            specialty: specialty.to_string(),
            rating: Some(4.7),
            location: Some(GeoPoint::new(40.7306, -73.9866)),
            location_text: "New York, NY".to_string(),
            min_hourly_rate: None,
            available: true,
        }
    }

    /// Valid request fields: shift starts in 4 hours, expires in 3.
    pub fn request_fields(specialty: &str, urgency: Urgency) -> NewUrgentRequest {
        let now = Utc::now();
        NewUrgentRequest {
            title: format!("{urgency} {specialty} cover"),
            description: Some("Short-notice shift coverage".to_string()),
            specialty: specialty.to_string(),
            urgency: Some(urgency),
            latitude: Some(40.7128),
            longitude: Some(-74.0060),
            location_text: "New York, NY".to_string(),
            hourly_rate: 110.0,
            priority_boost: false,
            featured: false,
            shift_start: Some(now + Duration::hours(4)),
            shift_end: Some(now + Duration::hours(16)),
            expires_at: Some(now + Duration::hours(3)),
        }
    }

    /// Post a request with default fields.
    pub async fn post_request(
        &self,
        requester_id: &str,
        specialty: &str,
        urgency: Urgency,
    ) -> Result<UrgentRequest, MedshiftError> {
        self.intake
            .admit_request(requester_id, Self::request_fields(specialty, urgency))
            .await
    }

    /// Answer a request as `responder_id`.
    pub async fn respond(
        &self,
        request_id: &str,
        responder_id: &str,
        kind: ResponseKind,
    ) -> Result<Response, MedshiftError> {
        self.lifecycle
            .submit_response(request_id, responder_id, ResponseSubmission::new(kind))
            .await
    }

    pub async fn balance(&self, requester_id: &str) -> Result<u32, MedshiftError> {
        self.intake.balance(requester_id).await
    }
}
