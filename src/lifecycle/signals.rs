//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a full reload of the engine, not shutdown

/// What the daemon should do in response to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    FullReload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn next_signal() -> SignalEvent {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install SIGTERM handler");
            None
        }
    };
    let mut hup = match signal(SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install SIGHUP handler");
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => SignalEvent::Shutdown,
        Some(_) = recv(&mut term) => SignalEvent::Shutdown,
        Some(_) = recv(&mut hup) => SignalEvent::FullReload,
    }
}

#[cfg(unix)]
async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> SignalEvent {
    let _ = tokio::signal::ctrl_c().await;
    SignalEvent::Shutdown
}
