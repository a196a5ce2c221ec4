//! HTTP surface of the daemon
//!
//! Exposes the signed webhook ingress plus health, readiness, liveness and
//! (optionally) a small debug surface:
//!
//! - `POST /hook`              : signed control-panel events, 202 on accept
//! - `GET  /health`            : status, uptime, version
//! - `GET  /ready`             : collaborator checks, 200 or 503
//! - `GET  /ping`              : trivial liveness
//! - `GET  /debug/pending`     : debug only
//! - `GET  /debug/last-error`  : last 10 failed records
//! - `GET  /debug/state`       : dump of all records
//! - `POST /debug/retry/{id}`  : reset a failed record and re-enqueue
//!
//! The webhook handler acknowledges with 202 before any provisioning work
//! runs; the pipeline task it spawns is not cancellable by the caller.

mod debug;
mod handlers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;

use whm2bunny_core::{Provisioner, StateStore, Validator};

/// Readiness flags for the collaborators the daemon depends on
#[derive(Debug, Default)]
pub struct ReadyChecks {
    provider: AtomicBool,
    notifier: AtomicBool,
    state: AtomicBool,
}

impl ReadyChecks {
    /// Mark the provider client as initialized
    pub fn set_provider(&self, ready: bool) {
        self.provider.store(ready, Ordering::SeqCst);
    }

    /// Mark the notifier as initialized
    pub fn set_notifier(&self, ready: bool) {
        self.notifier.store(ready, Ordering::SeqCst);
    }

    /// Mark the state store as initialized
    pub fn set_state(&self, ready: bool) {
        self.state.store(ready, Ordering::SeqCst);
    }

    fn snapshot(&self) -> (bool, bool, bool) {
        (
            self.provider.load(Ordering::SeqCst),
            self.notifier.load(Ordering::SeqCst),
            self.state.load(Ordering::SeqCst),
        )
    }
}

/// Shared state for every route handler
pub struct AppState {
    /// Provisioning pipeline the hook handler dispatches into
    pub provisioner: Arc<Provisioner>,
    /// Record store backing the debug routes
    pub state: Arc<StateStore>,
    /// Payload validator
    pub validator: Validator,
    /// Webhook HMAC secret
    pub secret: String,
    /// Daemon version reported by `/health`
    pub version: &'static str,
    /// Process start time for the uptime figure
    pub started_at: Instant,
    /// Whether the debug routes are mounted
    pub debug: bool,
    /// Collaborator readiness flags
    pub checks: ReadyChecks,
}

/// Build the daemon router. Split from the listener so tests can drive the
/// routes without binding a socket.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/hook", post(handlers::hook))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/ping", get(handlers::ping));

    if state.debug {
        router = router
            .route("/debug/pending", get(debug::pending))
            .route("/debug/last-error", get(debug::last_errors))
            .route("/debug/state", get(debug::state_dump))
            .route("/debug/retry/{id}", post(debug::retry));
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests;
