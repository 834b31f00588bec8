// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Marketplace workflows on top of the store and the event bus.
//!
//! - [`RequestIntake`] prices, debits, and admits urgent requests, then
//!   notifies the qualified audience.
//! - [`ResponseLifecycle`] takes responses and drives each request to a
//!   single accepted outcome.
//! - [`ExpirySweeper`] closes open requests once they pass their expiry.
//!
//! Every notification is persisted first and published after the write
//! commits. A failed notification is logged and never undoes the operation
//! that produced it.

pub mod intake;
pub mod lifecycle;
pub mod notify;
pub mod sweeper;

pub use intake::RequestIntake;
pub use lifecycle::{ResponseLifecycle, AUTO_REJECT_REASON};
pub use notify::{NotificationDraft, Notifier};
pub use sweeper::ExpirySweeper;
