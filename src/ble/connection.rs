//! BLE connection management.
//!
//! Opens a link to one peer with bounded retries. Transient radio-busy
//! conditions and ordinary failures are both retried after a fixed backoff;
//! once retries run out the failure is returned as a typed error.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use btleplug::api::BDAddr;

use crate::ble::transport::{ConnectTarget, RadioTransport};
use crate::error::{Error, Result};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default per-attempt connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before the first attempt so the radio can leave scan mode.
pub const RADIO_COOLDOWN: Duration = Duration::from_millis(500);

/// Pause after connecting before any GATT traffic.
pub const LINK_SETTLE: Duration = Duration::from_secs(1);

/// Pause between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Connection state for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection activity.
    #[default]
    Idle,
    /// An attempt is in flight.
    Connecting,
    /// Waiting out the backoff before the next attempt.
    RetryWait,
    /// A link is established.
    Connected,
    /// Retries are exhausted.
    Failed,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a connect call is still running.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::RetryWait)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::RetryWait => write!(f, "RetryWait"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// The peer address.
    pub address: BDAddr,
    /// The new connection state.
    pub state: ConnectionState,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Establishes links with bounded retry and backoff.
pub struct ConnectionManager<T: RadioTransport> {
    /// Radio used to connect.
    transport: Arc<T>,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Retries after the first attempt.
    max_retries: u32,
    /// Per-attempt timeout.
    timeout: Duration,
}

impl<T: RadioTransport> ConnectionManager<T> {
    /// Create a connection manager with default retry parameters.
    pub fn new(transport: Arc<T>) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            transport,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            event_tx,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the retry count and per-attempt timeout.
    pub fn with_retry_params(mut self, max_retries: u32, timeout: Duration) -> Self {
        self.max_retries = max_retries;
        self.timeout = timeout;
        self
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Maximum attempts per [`ConnectionManager::connect`] call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Connect to `target`.
    ///
    /// The returned link is owned by the caller and must be disconnected.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionTimeout`] if the final attempt timed out,
    /// [`Error::ConnectionFailed`] for any other final failure.
    pub async fn connect(&self, target: &ConnectTarget<T::Device>) -> Result<T::Link> {
        let address = target.address;
        let max_attempts = self.max_attempts();

        tokio::time::sleep(RADIO_COOLDOWN).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.set_state(address, ConnectionState::Connecting, attempt);
            debug!(
                "Connection attempt {} of {} to {}",
                attempt, max_attempts, address
            );

            match self.attempt(target).await {
                Ok(link) => {
                    self.set_state(address, ConnectionState::Connected, attempt);
                    info!("Connected to {}. Settling ({:?})", address, LINK_SETTLE);
                    tokio::time::sleep(LINK_SETTLE).await;
                    return Ok(link);
                }
                Err(e) if attempt >= max_attempts => {
                    self.set_state(address, ConnectionState::Failed, attempt);
                    error!("Connection to {} failed: {}", address, e);
                    return Err(Self::terminal_error(e, max_attempts));
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            "Radio busy ({}), retrying... ({}/{})",
                            e, attempt, max_attempts
                        );
                    } else {
                        warn!("Connect failed ({}), retrying...", e);
                    }
                    self.set_state(address, ConnectionState::RetryWait, attempt);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    /// Return to idle once the caller has released its link.
    pub fn mark_released(&self, address: BDAddr) {
        self.set_state(address, ConnectionState::Idle, 0);
    }

    /// One bounded connection attempt.
    async fn attempt(&self, target: &ConnectTarget<T::Device>) -> Result<T::Link> {
        match tokio::time::timeout(self.timeout, self.transport.connect(target, self.timeout)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout {
                timeout: self.timeout,
            }),
        }
    }

    /// Map the last attempt's error onto the caller-facing taxonomy.
    fn terminal_error(e: Error, attempts: u32) -> Error {
        match e {
            Error::ConnectionTimeout { .. } | Error::ConnectionFailed { .. } => e,
            Error::TransientRadio { reason } => Error::ConnectionFailed {
                reason: format!("radio still busy after {} attempts: {}", attempts, reason),
            },
            other => Error::ConnectionFailed {
                reason: other.to_string(),
            },
        }
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, address: BDAddr, new_state: ConnectionState, attempt: u32) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }

        let _ = self.event_tx.send(ConnectionEvent {
            address,
            state: new_state,
            attempt,
        });
    }
}
