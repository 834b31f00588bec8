// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport for the managed realtime channel service.
//!
//! The service speaks a channel protocol over JSON text frames shaped
//! `{topic, event, payload, ref}`. Every channel maps to the topic
//! `realtime:<channel>`; connection-level heartbeats use the `phoenix`
//! topic. Requests carrying a `ref` are acknowledged with a `phx_reply`
//! frame echoing that ref.
//!
//! - [`frame`]: the wire codec and server frame translation
//! - [`transport`]: [`WsTransport`], the [`RealtimeTransport`](medshift_core::RealtimeTransport)
//!   implementation

pub mod frame;
pub mod transport;

pub use frame::Frame;
pub use transport::WsTransport;
