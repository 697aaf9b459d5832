//! Run-scoped status reporting.
//!
//! Long-running phases report leveled, titled progress through an explicit
//! channel instead of process-wide mutable state: the runner opens a
//! [`StatusChannel`] at run start, hands [`StatusSink`] clones to each phase,
//! and closes the channel at run end, flushing buffered events into the
//! tracing subscriber.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Status,
    Warning,
}

/// One structured status record.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    /// Phase the event belongs to ("launch", "gather", "audit", ...).
    pub title: String,
    pub message: String,
}

/// Cloneable sender half handed to each phase of a run.
#[derive(Debug, Clone)]
pub struct StatusSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSink {
    /// Report normal progress.
    pub fn status(&self, title: &str, message: impl Into<String>) {
        self.emit(StatusLevel::Status, title, message.into());
    }

    /// Report a recoverable problem.
    pub fn warning(&self, title: &str, message: impl Into<String>) {
        self.emit(StatusLevel::Warning, title, message.into());
    }

    fn emit(&self, level: StatusLevel, title: &str, message: String) {
        // A closed channel means the run is already tearing down; the event
        // is not worth failing over.
        let _ = self.tx.send(StatusEvent {
            level,
            title: title.to_string(),
            message,
        });
    }
}

/// The receiving side: owns the drain task that forwards events to tracing.
pub struct StatusChannel {
    sink: StatusSink,
    close_tx: oneshot::Sender<()>,
    drain: JoinHandle<Vec<StatusEvent>>,
}

impl StatusChannel {
    /// Open the channel and start its drain task.
    pub fn open() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let drain = tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(event) => log_and_keep(event, &mut seen),
                        None => break,
                    },
                    _ = &mut close_rx => {
                        // Flush whatever is still buffered, then stop even
                        // if sink clones are outstanding.
                        while let Ok(event) = rx.try_recv() {
                            log_and_keep(event, &mut seen);
                        }
                        break;
                    }
                }
            }
            seen
        });
        Self {
            sink: StatusSink { tx },
            close_tx,
            drain,
        }
    }

    /// A sender for one phase of the run.
    pub fn sink(&self) -> StatusSink {
        self.sink.clone()
    }

    /// Close the channel and wait for buffered events to flush. Returns the
    /// events observed during the run, in order. Events sent after close are
    /// silently dropped.
    pub async fn close(self) -> Vec<StatusEvent> {
        drop(self.sink);
        let _ = self.close_tx.send(());
        self.drain.await.unwrap_or_default()
    }
}

fn log_and_keep(event: StatusEvent, seen: &mut Vec<StatusEvent>) {
    match event.level {
        StatusLevel::Status => tracing::info!(title = %event.title, "{}", event.message),
        StatusLevel::Warning => tracing::warn!(title = %event.title, "{}", event.message),
    }
    seen.push(event);
}
