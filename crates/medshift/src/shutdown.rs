// SPDX-FileCopyrightText: 2026 Medshift Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal handling for graceful shutdown.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolves with the name of the first termination signal received.
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}

/// Returns a token that is cancelled on SIGINT (Ctrl+C) or SIGTERM.
///
/// Cancelling the token directly also stops the listener task.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = trigger.cancelled() => {
                debug!("shutdown requested without a signal");
            }
            signal = wait_for_signal() => {
                info!(signal, "initiating shutdown");
                trigger.cancel();
            }
        }
    });

    token
}
