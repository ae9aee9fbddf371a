use std::sync::{Condvar, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Agent, Error};

/// Snapshot of the client's connectivity as seen by the background health checks.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Last agent returned by the server.
    pub agent: Option<Agent>,
    #[serde(skip)]
    pub last_error: Option<Error>,
    /// Time of the last successful verification or probe.
    pub last_check: Option<DateTime<Utc>>,
}

/// `ConnectionStore` holds the connectivity state shared between the client and the health-check
/// thread. Writers are the verification and the periodic probe; readers never block on I/O.
pub(crate) struct ConnectionStore {
    status: RwLock<ConnectionStatus>,
    /// Set once the first verification or probe has completed.
    checked: (Mutex<bool>, Condvar),
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::default()),
            checked: (Mutex::new(false), Condvar::new()),
        }
    }

    pub fn get_status(&self) -> ConnectionStatus {
        // Err() is only possible if a writer panicked while holding the lock. Fall back to the
        // initial state rather than crashing the app.
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.status
            .read()
            .map(|status| status.connected)
            .unwrap_or(false)
    }

    /// Record a successful check. `agent` replaces the stored agent only when present.
    ///
    /// Returns whether the client was connected before.
    pub fn set_connected(&self, agent: Option<Agent>) -> bool {
        let now = Utc::now();
        let was_connected = match self.status.write() {
            Ok(mut status) => {
                let was_connected = status.connected;
                status.connected = true;
                status.last_error = None;
                status.last_check = Some(now);
                if agent.is_some() {
                    status.agent = agent;
                }
                was_connected
            }
            Err(_) => false,
        };
        self.mark_checked();
        was_connected
    }

    /// Record a failed check.
    ///
    /// Returns whether the client was connected before.
    pub fn set_disconnected(&self, error: Error) -> bool {
        let was_connected = match self.status.write() {
            Ok(mut status) => {
                let was_connected = status.connected;
                status.connected = false;
                status.last_error = Some(error);
                was_connected
            }
            Err(_) => false,
        };
        self.mark_checked();
        was_connected
    }

    /// Wake every waiter without touching the status. Called when the health-check thread exits,
    /// which may happen before any check has been recorded.
    pub fn release_waiters(&self) {
        self.mark_checked();
    }

    fn mark_checked(&self) {
        if let Ok(mut checked) = self.checked.0.lock() {
            *checked = true;
            self.checked.1.notify_all();
        }
    }

    /// Block until the first check has been recorded, then return the current status.
    pub fn wait_for_first_check(&self) -> ConnectionStatus {
        if let Ok(mut checked) = self.checked.0.lock() {
            while !*checked {
                checked = match self.checked.1.wait(checked) {
                    Ok(checked) => checked,
                    Err(_) => break,
                };
            }
        }
        self.get_status()
    }
}
