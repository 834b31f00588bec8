// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Medshift integration tests.
//!
//! Provides a mock realtime transport and a test harness that wires the
//! whole dispatch stack onto a temp SQLite database, for fast,
//! deterministic tests without external services.
//!
//! # Components
//!
//! - [`MockTransport`] - Scriptable realtime transport with call capture and frame injection
//! - [`TestHarness`] - Store, bus, intake, lifecycle, and sweeper over a temp database

pub mod harness;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_transport::{MockTransport, TransportCall};
