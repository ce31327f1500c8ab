use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

use super::{ChannelStatus, HistoryEntry, QueueSettings};
use crate::error::ChannelError;
use crate::events::{EventHandler, EventKind, EventNotifier, QueueEvent};
use crate::transport::{PortSettings, Transport};
use firestep_shared::device::{Device, DeviceError};
use firestep_shared::wire::{Command, Response};

/// Requests sent from [`CommandQueue`](super::CommandQueue) handles to the worker.
pub(crate) enum QueueRequest {
    Open {
        serial_path: String,
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    },
    Close,
    Push {
        command: Command,
        respond_to: oneshot::Sender<Result<Response, ChannelError>>,
    },
    On {
        kind: EventKind,
        handler: EventHandler,
    },
    History {
        respond_to: oneshot::Sender<Vec<HistoryEntry>>,
    },
    QueueLength {
        respond_to: oneshot::Sender<usize>,
    },
    Status {
        respond_to: oneshot::Sender<ChannelStatus>,
    },
}

struct QueueEntry {
    seq: u64,
    command: Command,
    respond_to: oneshot::Sender<Result<Response, ChannelError>>,
}

pub(crate) struct QueueWorker<D, T> {
    device: D,
    state: QueueState<T>,
    rx: mpsc::UnboundedReceiver<QueueRequest>,
}

struct QueueState<T> {
    settings: QueueSettings,
    transport: T,
    driver: String,
    serial_path: Option<String>,
    available: bool,
    pending: VecDeque<QueueEntry>,
    history: VecDeque<HistoryEntry>,
    in_flight: Option<u64>,
    next_seq: u64,
    reads: u64,
    writes: u64,
    events: EventNotifier,
}

impl<D, T> QueueWorker<D, T>
where
    D: Device,
    T: Transport,
{
    pub(crate) fn new(
        settings: QueueSettings,
        device: D,
        transport: T,
        rx: mpsc::UnboundedReceiver<QueueRequest>,
    ) -> Self {
        let driver = device.name().to_string();
        Self {
            device,
            state: QueueState {
                settings,
                transport,
                driver,
                serial_path: None,
                available: false,
                pending: VecDeque::new(),
                history: VecDeque::new(),
                in_flight: None,
                next_seq: 0,
                reads: 0,
                writes: 0,
                events: EventNotifier::new(),
            },
            rx,
        }
    }

    /// Runs until every handle is dropped and nothing more can be sent.
    /// Entries still pending at that point resolve with `WorkerGone`.
    pub(crate) async fn run(mut self) {
        tracing::debug!("Command queue worker started for {}", self.state.driver);
        loop {
            let Some(entry) = self.state.begin_next() else {
                match self.rx.recv().await {
                    Some(request) => {
                        self.state.handle(request).await;
                        continue;
                    }
                    None => break,
                }
            };

            // Requests keep flowing while the device works; only sending waits.
            let mut reply = self.device.respond(&entry.command);
            let outcome = loop {
                tokio::select! {
                    outcome = &mut reply => break outcome,
                    Some(request) = self.rx.recv() => self.state.handle(request).await,
                }
            };
            drop(reply);
            self.state.complete(entry, outcome);
        }
        if !self.state.pending.is_empty() {
            tracing::warn!(
                "Command queue worker for {} stopped with {} unsent commands",
                self.state.driver,
                self.state.pending.len()
            );
        }
        tracing::debug!("Command queue worker stopped for {}", self.state.driver);
    }
}

impl<T: Transport> QueueState<T> {
    async fn handle(&mut self, request: QueueRequest) {
        match request {
            QueueRequest::Open {
                serial_path,
                respond_to,
            } => {
                let result = self.open(serial_path).await;
                let _ = respond_to.send(result);
            }
            QueueRequest::Close => self.close().await,
            QueueRequest::Push {
                command,
                respond_to,
            } => self.push(command, respond_to),
            QueueRequest::On { kind, handler } => {
                self.events.on(kind, handler);
            }
            QueueRequest::History { respond_to } => {
                let _ = respond_to.send(self.history.iter().cloned().collect());
            }
            QueueRequest::QueueLength { respond_to } => {
                let _ = respond_to.send(self.pending.len());
            }
            QueueRequest::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    async fn open(&mut self, serial_path: String) -> Result<(), ChannelError> {
        let port = PortSettings {
            serial_path: serial_path.clone(),
            baud_rate: self.settings.baud_rate,
            launch_timeout: self.settings.launch_timeout,
        };
        self.serial_path = Some(serial_path.clone());
        match self.transport.open(&port).await {
            Ok(()) => {
                self.reads = 0;
                self.writes = 0;
                self.available = true;
                tracing::info!(
                    "Opened {} at {} ({} baud, {} pending)",
                    self.driver,
                    serial_path,
                    port.baud_rate,
                    self.pending.len()
                );
                Ok(())
            }
            Err(source) => {
                self.available = false;
                tracing::warn!("Could not open {} at {}: {}", self.driver, serial_path, source);
                Err(ChannelError::TransportUnavailable {
                    serial_path,
                    source,
                })
            }
        }
    }

    async fn close(&mut self) {
        self.transport.close().await;
        self.available = false;
        tracing::info!(
            "Closed {} ({} pending)",
            self.driver,
            self.pending.len()
        );
    }

    fn push(
        &mut self,
        command: Command,
        respond_to: oneshot::Sender<Result<Response, ChannelError>>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if !self.available {
            tracing::debug!(
                "{} unavailable, holding #{} {} ({} pending)",
                self.driver,
                seq,
                command,
                self.pending.len() + 1
            );
        }
        self.pending.push_back(QueueEntry {
            seq,
            command,
            respond_to,
        });
    }

    /// Take the next pending entry and record it as written, if the channel
    /// can send right now.
    fn begin_next(&mut self) -> Option<QueueEntry> {
        if !self.available || self.in_flight.is_some() {
            return None;
        }
        if !self.transport.is_open() {
            tracing::warn!(
                "Transport for {} closed underneath the queue; holding {} commands",
                self.driver,
                self.pending.len()
            );
            self.available = false;
            return None;
        }
        let entry = self.pending.pop_front()?;
        self.writes += 1;
        self.in_flight = Some(entry.seq);
        tracing::debug!("{} write({}) {}", self.driver, self.writes, entry.command);
        self.history.push_front(HistoryEntry {
            seq: entry.seq,
            command: entry.command.clone(),
            response: None,
        });
        self.history.truncate(self.settings.max_history);
        Some(entry)
    }

    fn complete(&mut self, entry: QueueEntry, outcome: Result<Response, DeviceError>) {
        match outcome {
            Ok(response) => {
                self.reads += 1;
                tracing::debug!("{} read({}) {}", self.driver, self.reads, response);
                if let Some(record) = self.history.iter_mut().find(|r| r.seq == entry.seq) {
                    record.response = Some(response.clone());
                }
                self.events.fire(&QueueEvent::Response(&response));
                let _ = entry.respond_to.send(Ok(response));
            }
            Err(e) => {
                self.available = false;
                tracing::warn!(
                    "{} failed on #{} {}: {}; channel unavailable until reopened",
                    self.driver,
                    entry.seq,
                    entry.command,
                    e
                );
                let _ = entry.respond_to.send(Err(ChannelError::Device(e)));
            }
        }
        self.in_flight = None;
        if self.pending.is_empty() {
            self.events.fire(&QueueEvent::Idle);
        }
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus {
            driver: self.driver.clone(),
            serial_path: self.serial_path.clone(),
            available: self.available,
            reads: self.reads,
            writes: self.writes,
            in_flight: self.in_flight,
            queue_length: self.pending.len(),
            history_length: self.history.len(),
            max_history: self.settings.max_history,
            baud_rate: self.settings.baud_rate,
            launch_timeout_ms: self.settings.launch_timeout.as_millis() as u64,
        }
    }
}
