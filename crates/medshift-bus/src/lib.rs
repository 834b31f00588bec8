// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event distribution for Medshift.
//!
//! An [`EventBus`] fans typed [`BusEvent`]s out to in-process subscribers,
//! either by event kind or by channel with an [`EventFilter`]. A failing
//! subscriber never prevents delivery to the others. Presence frames from
//! the realtime service are folded by a [`PresenceTracker`] into
//! `user_status_changed` events.

pub mod bus;
pub mod event;
pub mod filter;
pub mod presence;

pub use bus::{DeliveryReport, EventBus, Handler, SubscriptionHandle, SubscriptionId};
pub use event::{
    user_channel, BusEvent, EventKind, PresenceChange, CONNECTION_CHANNEL, NOTIFICATIONS_CHANNEL,
    REQUESTS_CHANNEL,
};
pub use filter::{matches_filters, EventFilter};
pub use presence::PresenceTracker;
