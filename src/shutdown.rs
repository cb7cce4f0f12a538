//! Operator interrupt handling.
//!
//! The first SIGINT (Ctrl+C), SIGTERM or SIGHUP cancels a
//! [`tokio_util::sync::CancellationToken`]: no new transfer is dispatched,
//! in-flight transfers finish their current attempt, and the ledger keeps
//! every task that committed. A second signal force-exits.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status used for interrupted runs (128 + SIGINT).
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Install signal handlers and return the token cancelled on the first signal.
pub(crate) fn install_signal_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    tracing::warn!(
                        "Could not listen for Ctrl+C; interrupts will not drain cleanly"
                    );
                    return;
                }
            }

            let prev = count.fetch_add(1, Ordering::SeqCst);
            if prev == 0 {
                tracing::info!("Interrupt received, letting in-flight transfers finish...");
                tracing::info!("Press Ctrl+C again to exit immediately");
                handler_token.cancel();
            } else {
                tracing::warn!("Forced exit; in-flight transfers are abandoned");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    });

    Ok(token)
}
