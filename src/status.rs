//! Status indicator states.
//!
//! The engine reports phase transitions through [`StatusIndicator`]. The
//! indicator owns its own display loop; [`StatusBoard`] is the in-memory
//! implementation that display loops and the HTTP layer read from.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// How long the error state is shown before reverting to idle.
pub const ERROR_HOLD: Duration = Duration::from_secs(2);

/// Phase shown on the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IndicatorState {
    /// Waiting for work.
    #[default]
    Idle,
    /// A scan is running.
    Scanning,
    /// Connecting to or probing a peer.
    Connecting,
    /// The last operation failed.
    Error,
}

impl IndicatorState {
    /// Toggle period for a blinking LED, or `None` for solid on.
    pub fn blink_interval(&self) -> Option<Duration> {
        match self {
            Self::Idle => Some(Duration::from_secs(1)),
            Self::Scanning => Some(Duration::from_millis(100)),
            Self::Connecting => Some(Duration::from_millis(300)),
            Self::Error => None,
        }
    }
}

impl std::fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Receives phase transitions from the engine.
#[cfg_attr(test, mockall::automock)]
pub trait StatusIndicator: Send + Sync {
    /// Show a new phase.
    fn set_state(&self, state: IndicatorState);
}

#[derive(Debug, Clone, Copy)]
struct Shown {
    state: IndicatorState,
    since: Instant,
}

/// Status indicator whose error state expires on its own.
///
/// `Error` reads back as `Idle` once the hold period has passed, so nothing
/// has to be scheduled to reset it.
#[derive(Debug)]
pub struct StatusBoard {
    shown: RwLock<Shown>,
    error_hold: Duration,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Create a board showing `Idle`.
    pub fn new() -> Self {
        Self::with_error_hold(ERROR_HOLD)
    }

    /// Create a board with a custom error hold period.
    pub fn with_error_hold(error_hold: Duration) -> Self {
        Self {
            shown: RwLock::new(Shown {
                state: IndicatorState::Idle,
                since: Instant::now(),
            }),
            error_hold,
        }
    }

    /// The state to display right now.
    pub fn state(&self) -> IndicatorState {
        let shown = *self.shown.read();
        if shown.state == IndicatorState::Error && shown.since.elapsed() >= self.error_hold {
            IndicatorState::Idle
        } else {
            shown.state
        }
    }
}

impl StatusIndicator for StatusBoard {
    fn set_state(&self, state: IndicatorState) {
        let mut shown = self.shown.write();
        if shown.state != state {
            tracing::debug!("Status changed: {} -> {}", shown.state, state);
        }
        *shown = Shown {
            state,
            since: Instant::now(),
        };
    }
}
