//! Worker lifecycle state machine.
//!
//! ```text
//! Uninstalled → Installing → Installed (waiting) → Activating → Active
//!                    │              │                   │          │
//!                    └──────────────┴───────────────────┴──────────┴──→ Redundant
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ServiceWorkerError;

/// Lifecycle phase of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Created, install not started.
    #[default]
    Uninstalled,
    /// Precaching the asset manifest.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Evicting stale caches and claiming clients.
    Activating,
    /// Active and controlling pages.
    Active,
    /// Replaced, unregistered, or failed to install.
    Redundant,
}

impl WorkerPhase {
    /// Only an active worker answers fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerPhase::Active)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, WorkerPhase::Installed)
    }

    /// Whether `self → to` is a legal edge.
    pub fn can_transition_to(&self, to: WorkerPhase) -> bool {
        use WorkerPhase::*;
        matches!(
            (*self, to),
            (Uninstalled, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Active)
                | (Installing | Installed | Activating | Active, Redundant)
        )
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerPhase::Uninstalled => "uninstalled",
            WorkerPhase::Installing => "installing",
            WorkerPhase::Installed => "installed",
            WorkerPhase::Activating => "activating",
            WorkerPhase::Active => "active",
            WorkerPhase::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// What a skip-waiting request resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipWaiting {
    /// The worker is waiting; activate it now.
    ActivateNow,
    /// Install has not finished; activate as soon as it does.
    Deferred,
    /// Already activating/active, or redundant.
    Ignored,
}

/// Phase plus the pending skip-waiting flag.
///
/// Both live behind one lock so a skip-waiting request racing with the end
/// of install is never lost.
#[derive(Debug, Default)]
pub struct Lifecycle {
    phase: WorkerPhase,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Whether skip-waiting has been requested.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Move to `to`, returning the previous phase.
    pub fn advance(&mut self, to: WorkerPhase) -> Result<WorkerPhase, ServiceWorkerError> {
        let from = self.phase;
        if !from.can_transition_to(to) {
            return Err(ServiceWorkerError::InvalidTransition { from, to });
        }
        self.phase = to;
        Ok(from)
    }

    /// Record a skip-waiting request and decide what to do with it.
    pub fn request_skip_waiting(&mut self) -> SkipWaiting {
        match self.phase {
            WorkerPhase::Uninstalled | WorkerPhase::Installing => {
                self.skip_waiting = true;
                SkipWaiting::Deferred
            }
            WorkerPhase::Installed => {
                self.skip_waiting = true;
                SkipWaiting::ActivateNow
            }
            WorkerPhase::Activating | WorkerPhase::Active | WorkerPhase::Redundant => {
                SkipWaiting::Ignored
            }
        }
    }
}
