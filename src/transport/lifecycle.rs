//! Per-connection state machine shared by every transport.
//!
//! ```text
//! Connecting ──attach──▶ Attached ──activate──▶ Active ◀─┐
//!      │                    │                     │  └───┘
//!      └────────────────────┴──────begin_close────┴──▶ Closing ──finish_close──▶ Closed
//! ```
//!
//! [`Lifecycle::begin_close`] is the single teardown entry point. Only the
//! first call wins; it cancels the connection's token synchronously, so any
//! timer selecting on that token stops before its next write.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Where a connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport constructed, not yet bound or registered.
    Connecting,
    /// Bound to a server (and registered, for session transports).
    Attached,
    /// At least one message exchanged.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Lowercase name for logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Attached => "attached",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// `true` while messages may still be exchanged.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Attached | Self::Active)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State plus the cancellation token owned by one connection.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<ConnectionState>,
    cancel: CancellationToken,
}

impl Lifecycle {
    /// Starts in [`ConnectionState::Connecting`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Connecting),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.lock()
    }

    /// `true` once teardown has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    /// Token cancelled when teardown begins.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `Connecting -> Attached`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if teardown already began, or
    /// [`TransportError::InvalidTransition`] if already attached.
    pub fn attach(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        match *state {
            ConnectionState::Connecting => {
                *state = ConnectionState::Attached;
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(TransportError::Closed),
            other => Err(TransportError::InvalidTransition {
                from: other.as_str(),
                to: ConnectionState::Attached.as_str(),
            }),
        }
    }

    /// `Attached | Active -> Active`. Called before each exchange.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if teardown already began, or
    /// [`TransportError::InvalidTransition`] if never attached.
    pub fn activate(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        match *state {
            ConnectionState::Attached | ConnectionState::Active => {
                *state = ConnectionState::Active;
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(TransportError::Closed),
            ConnectionState::Connecting => Err(TransportError::InvalidTransition {
                from: ConnectionState::Connecting.as_str(),
                to: ConnectionState::Active.as_str(),
            }),
        }
    }

    /// Moves to `Closing` and cancels the token.
    ///
    /// Returns `true` only for the call that started teardown; later calls
    /// do nothing and return `false`.
    pub fn begin_close(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
            return false;
        }
        *state = ConnectionState::Closing;
        drop(state);

        self.cancel.cancel();
        true
    }

    /// `Closing -> Closed`. No effect in any other state.
    pub fn finish_close(&self) {
        let mut state = self.lock();
        if *state == ConnectionState::Closing {
            *state = ConnectionState::Closed;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
