//! Keep-alive writer for event streams.
//!
//! Proxies drop idle streams, so every open SSE connection gets a periodic
//! comment frame. The timer stops as soon as the session's cancellation
//! token fires, and a failed write tears the session down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::session::{CloseReason, Frame, Session, SessionRegistry};

/// Default keep-alive interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How a heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The connection's token was cancelled.
    Cancelled,
    /// The stream was gone when a keep-alive was due.
    WriteFailed,
}

/// Writes [`Frame::KeepAlive`] to `sink` every `period` until `cancel` fires.
///
/// The first keep-alive is sent one full period after start. A full buffer
/// skips that beat; real messages are already keeping the stream busy.
pub async fn run_heartbeat(
    sink: mpsc::Sender<Frame>,
    period: Duration,
    cancel: CancellationToken,
) -> HeartbeatOutcome {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatOutcome::Cancelled,
            _ = ticker.tick() => {}
        }

        match sink.try_send(Frame::KeepAlive) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Event stream busy, skipping keep-alive"),
            Err(TrySendError::Closed(_)) => return HeartbeatOutcome::WriteFailed,
        }
    }
}

/// Spawns the heartbeat for `session`.
///
/// On a failed write the session is closed with [`CloseReason::WriteFailed`].
/// Sessions without a push channel get a task that finishes immediately.
pub fn spawn_heartbeat(
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    period: Duration,
) -> JoinHandle<HeartbeatOutcome> {
    let sink = session.sender();
    let cancel = session.lifecycle().cancellation();

    tokio::spawn(async move {
        let Some(sink) = sink else {
            return HeartbeatOutcome::Cancelled;
        };

        let outcome = run_heartbeat(sink, period, cancel).await;
        if outcome == HeartbeatOutcome::WriteFailed {
            warn!(session_id = %session.id(), "Keep-alive write failed");
            session.close(&registry, CloseReason::WriteFailed);
        }
        outcome
    })
}
