//! Serialized command channel to a FireStep device.
//!
//! A [`CommandQueue`] is a cheap, cloneable handle to a worker task that
//! owns the device, the transport and all queue bookkeeping. Commands go
//! out strictly one at a time in FIFO order; each push returns a
//! [`Completion`] that resolves with the device's reply.

mod worker;

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::ChannelError;
use crate::events::{EventKind, QueueEvent};
use crate::transport::Transport;
use firestep_shared::config::DeviceConfig;
use firestep_shared::device::Device;
use firestep_shared::wire::{Command, Response};

use worker::{QueueRequest, QueueWorker};

/// Settings the queue applies on every open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Most recent commands retained in history; `0` keeps none.
    pub max_history: usize,
    pub baud_rate: u32,
    pub launch_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&DeviceConfig::default())
    }
}

impl From<&DeviceConfig> for QueueSettings {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            max_history: config.max_history,
            baud_rate: config.baud_rate,
            launch_timeout: Duration::from_millis(config.launch_timeout_ms),
        }
    }
}

/// A sent command and, once it arrives, its reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub command: Command,
    pub response: Option<Response>,
}

/// Snapshot of the channel, as seen by the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub driver: String,
    pub serial_path: Option<String>,
    pub available: bool,
    pub reads: u64,
    pub writes: u64,
    pub in_flight: Option<u64>,
    pub queue_length: usize,
    pub history_length: usize,
    pub max_history: usize,
    pub baud_rate: u32,
    pub launch_timeout_ms: u64,
}

/// Resolves once the device has answered a pushed command.
///
/// Dropping a `Completion` does not cancel the command.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<Response, ChannelError>>,
}

impl Future for Completion {
    type Output = Result<Response, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ChannelError::WorkerGone)))
    }
}

#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<QueueRequest>,
}

impl CommandQueue {
    /// Start the queue worker on the current tokio runtime. The channel
    /// starts closed; call [`open`](Self::open) before commands are sent.
    pub fn spawn<D, T>(settings: QueueSettings, device: D, transport: T) -> Self
    where
        D: Device + 'static,
        T: Transport + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = QueueWorker::new(settings, device, transport, rx);
        tokio::spawn(worker.run());
        Self { tx }
    }

    /// Open the transport at `serial_path`. On success the read and write
    /// counters reset and processing of pending commands resumes.
    pub async fn open(&self, serial_path: impl Into<String>) -> Result<(), ChannelError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(QueueRequest::Open {
            serial_path: serial_path.into(),
            respond_to,
        })?;
        rx.await.map_err(|_| ChannelError::WorkerGone)?
    }

    /// Close the transport. Pending commands stay queued; an in-flight
    /// command still completes.
    pub fn close(&self) {
        if self.send(QueueRequest::Close).is_err() {
            tracing::debug!("Close requested after the command queue worker stopped");
        }
    }

    /// Append `command` to the queue.
    pub fn push_queue(&self, command: Command) -> Completion {
        let (respond_to, rx) = oneshot::channel();
        // A failed send drops `respond_to`, so the completion resolves to WorkerGone.
        let _ = self.send(QueueRequest::Push { command, respond_to });
        Completion { rx }
    }

    /// Register the handler for `kind`, replacing any earlier one.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: FnMut(&QueueEvent<'_>) + Send + 'static,
    {
        let _ = self.send(QueueRequest::On {
            kind,
            handler: Box::new(handler),
        });
    }

    /// Sent commands, most recent first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ChannelError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(QueueRequest::History { respond_to })?;
        rx.await.map_err(|_| ChannelError::WorkerGone)
    }

    /// Commands waiting to be sent, not counting the one in flight.
    pub async fn queue_length(&self) -> Result<usize, ChannelError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(QueueRequest::QueueLength { respond_to })?;
        rx.await.map_err(|_| ChannelError::WorkerGone)
    }

    pub async fn status(&self) -> Result<ChannelStatus, ChannelError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(QueueRequest::Status { respond_to })?;
        rx.await.map_err(|_| ChannelError::WorkerGone)
    }

    fn send(&self, request: QueueRequest) -> Result<(), ChannelError> {
        self.tx.send(request).map_err(|_| ChannelError::WorkerGone)
    }
}
