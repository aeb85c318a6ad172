//! Command and status channels between the operator and the control thread.
//!
//! | Lane | Direction | Channel |
//! |---|---|---|
//! | commands | operator → control thread | bounded [`mpsc`], single consumer |
//! | status | control thread → every listener | [`broadcast`], lossy for slow readers |
//!
//! Both ends work from plain threads (`blocking_*`, `try_*`) and from async
//! tasks (`send_async`, `recv`). The blocking calls must not be made from
//! inside a Tokio runtime.
//!
//! # Example
//!
//! ```rust
//! use gridbot_middleware::control_link;
//! use gridbot_types::{OperatorCommand, StatusPayload};
//!
//! let (operator, mut control) = control_link(8);
//! let mut status = operator.subscribe();
//!
//! operator.send(OperatorCommand::Explore).unwrap();
//! assert_eq!(control.try_recv().unwrap(), Some(OperatorCommand::Explore));
//!
//! control.publish(StatusPayload::Message("exploring".into()));
//! assert!(status.try_recv().unwrap().is_some());
//! ```

use gridbot_types::{NavError, OperatorCommand, StatusEvent, StatusPayload};
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

/// Default capacity of both lanes.
pub const DEFAULT_CAPACITY: usize = 64;

const SOURCE: &str = "gridbot-runtime::control";

/// Create a connected pair of channel ends with the given capacity.
pub fn control_link(capacity: usize) -> (OperatorLink, ControlLink) {
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (status_tx, _) = broadcast::channel(capacity);
    (
        OperatorLink {
            commands: command_tx,
            status: status_tx.clone(),
        },
        ControlLink {
            commands: command_rx,
            status: status_tx,
        },
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Operator side
// ────────────────────────────────────────────────────────────────────────────

/// Operator end: sends commands, subscribes to status. Clone it cheaply.
#[derive(Debug, Clone)]
pub struct OperatorLink {
    commands: mpsc::Sender<OperatorCommand>,
    status: broadcast::Sender<StatusEvent>,
}

impl OperatorLink {
    /// Send a command from a plain thread, waiting for queue space.
    pub fn send(&self, command: OperatorCommand) -> Result<(), NavError> {
        self.commands
            .blocking_send(command)
            .map_err(|e| NavError::Channel(format!("control thread gone: {e}")))
    }

    /// Send a command from an async task.
    pub async fn send_async(&self, command: OperatorCommand) -> Result<(), NavError> {
        self.commands
            .send(command)
            .await
            .map_err(|e| NavError::Channel(format!("control thread gone: {e}")))
    }

    /// Listen to everything the control thread publishes from now on.
    pub fn subscribe(&self) -> StatusReceiver {
        StatusReceiver {
            receiver: self.status.subscribe(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Control side
// ────────────────────────────────────────────────────────────────────────────

/// Control-thread end: drains commands, publishes status.
#[derive(Debug)]
pub struct ControlLink {
    commands: mpsc::Receiver<OperatorCommand>,
    status: broadcast::Sender<StatusEvent>,
}

impl ControlLink {
    /// Next queued command without waiting.
    ///
    /// # Errors
    ///
    /// [`NavError::Channel`] once every [`OperatorLink`] has been dropped and
    /// the queue is empty.
    pub fn try_recv(&mut self) -> Result<Option<OperatorCommand>, NavError> {
        match self.commands.try_recv() {
            Ok(cmd) => Ok(Some(cmd)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(NavError::Channel("operator disconnected".to_string()))
            }
        }
    }

    /// Wait for the next command on a plain thread. `None` once every
    /// [`OperatorLink`] is gone.
    pub fn blocking_recv(&mut self) -> Option<OperatorCommand> {
        self.commands.blocking_recv()
    }

    /// Publish a status payload. Returns how many listeners got it; zero
    /// listeners is normal.
    pub fn publish(&self, payload: StatusPayload) -> usize {
        let event = StatusEvent::new(SOURCE, payload);
        match self.status.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                trace!(id = %event.id, "status dropped: no listeners");
                0
            }
        }
    }

    /// Convenience for [`StatusPayload::Message`].
    pub fn say(&self, text: impl Into<String>) -> usize {
        self.publish(StatusPayload::Message(text.into()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Status receiver
// ────────────────────────────────────────────────────────────────────────────

/// A subscription to the status lane.
#[derive(Debug)]
pub struct StatusReceiver {
    receiver: broadcast::Receiver<StatusEvent>,
}

impl StatusReceiver {
    /// Wait for the next status event. `None` once the control side is gone.
    ///
    /// Events missed because this receiver fell behind are skipped with a
    /// warning.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "status receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of [`StatusReceiver::recv`] for plain threads.
    pub fn blocking_recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "status receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting.
    ///
    /// # Errors
    ///
    /// [`NavError::Channel`] when the control side is gone.
    pub fn try_recv(&mut self) -> Result<Option<StatusEvent>, NavError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(missed = n, "status receiver lagged");
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(NavError::Channel("control thread gone".to_string()));
                }
            }
        }
    }
}
