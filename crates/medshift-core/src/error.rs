// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Medshift urgent staffing subsystem.

use thiserror::Error;

use crate::types::{RequestStatus, ResponseStatus};

/// The primary error type used across Medshift traits and core operations.
///
/// State-machine violations (`RequestClosed`, `ExpiredRequest`,
/// `DuplicateResponse`, `AlreadyResolved`) are surfaced verbatim to the
/// caller. Transport failures are normally absorbed by the connection
/// manager and only escape once the reconnect budget is exhausted.
#[derive(Debug, Error)]
pub enum MedshiftError {
    /// Malformed or missing input. Never retried automatically.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requester's balance does not cover the request cost.
    #[error("insufficient credits: balance {balance}, cost {cost}")]
    InsufficientCredits { balance: u32, cost: u32 },

    /// The requester has no active credit account.
    #[error("no active credit account for requester {requester_id}")]
    NoCreditAccount { requester_id: String },

    /// The request is no longer accepting responses or decisions.
    #[error("request {request_id} is not open (status: {status})")]
    RequestClosed {
        request_id: String,
        status: RequestStatus,
    },

    /// The request passed its expiry time while still open.
    #[error("request {request_id} expired at {expires_at}")]
    ExpiredRequest {
        request_id: String,
        expires_at: String,
    },

    /// The responder already answered this request.
    #[error("responder {responder_id} already responded to request {request_id}")]
    DuplicateResponse {
        request_id: String,
        responder_id: String,
    },

    /// A decision was already made for this request or response.
    #[error("request {request_id} is already resolved (response status: {status})")]
    AlreadyResolved {
        request_id: String,
        status: ResponseStatus,
    },

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Realtime channel bridge failure (connect, subscribe, publish, heartbeat).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A single subscriber handler failed during fan-out.
    #[error("delivery to {subscriber} failed: {message}")]
    Delivery { subscriber: String, message: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MedshiftError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        MedshiftError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MedshiftError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the failure is transient and may succeed on retry.
    ///
    /// Only transport failures and timeouts qualify. Business rule and
    /// state-machine violations are final for the given input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MedshiftError::Transport { .. } | MedshiftError::Timeout { .. }
        )
    }

    /// An actionable message suitable for showing to the requester or responder.
    pub fn user_message(&self) -> String {
        match self {
            MedshiftError::Validation(msg) => format!("Please check the request: {msg}"),
            MedshiftError::InsufficientCredits { balance, cost } => format!(
                "This request costs {cost} credits but only {balance} are available. \
                 Purchase more credits to post it."
            ),
            MedshiftError::NoCreditAccount { .. } => {
                "An active subscription is required to post urgent requests.".to_string()
            }
            MedshiftError::RequestClosed { status, .. } => {
                format!("This request is no longer open ({status}).")
            }
            MedshiftError::ExpiredRequest { .. } => "This request has expired.".to_string(),
            MedshiftError::DuplicateResponse { .. } => {
                "You have already responded to this request.".to_string()
            }
            MedshiftError::AlreadyResolved { .. } => {
                "A decision has already been made for this request.".to_string()
            }
            MedshiftError::NotFound { kind, .. } => format!("The {kind} could not be found."),
            MedshiftError::Forbidden(_) => "You are not allowed to do that.".to_string(),
            MedshiftError::Transport { .. } | MedshiftError::Timeout { .. } => {
                "Live updates are temporarily unavailable.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_timeout_are_retryable() {
        assert!(MedshiftError::transport("down").is_retryable());
        assert!(
            MedshiftError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_retryable()
        );
        assert!(!MedshiftError::Validation("x".into()).is_retryable());
        assert!(
            !MedshiftError::InsufficientCredits {
                balance: 12,
                cost: 15
            }
            .is_retryable()
        );
    }

    #[test]
    fn insufficient_credits_message_names_both_amounts() {
        let err = MedshiftError::InsufficientCredits {
            balance: 12,
            cost: 15,
        };
        assert_eq!(err.to_string(), "insufficient credits: balance 12, cost 15");
        let msg = err.user_message();
        assert!(msg.contains("15 credits"), "got: {msg}");
        assert!(msg.contains("12 are available"), "got: {msg}");
    }

    #[test]
    fn request_closed_displays_status() {
        let err = MedshiftError::RequestClosed {
            request_id: "req-1".into(),
            status: RequestStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "request req-1 is not open (status: in_progress)"
        );
    }
}
