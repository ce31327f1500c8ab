//! Queue notifications: `idle` when the pending queue drains, `response`
//! whenever a command completes.

use std::fmt;

use firestep_shared::wire::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Idle,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueueEvent<'a> {
    Idle,
    Response(&'a Response),
}

impl QueueEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::Idle => EventKind::Idle,
            QueueEvent::Response(_) => EventKind::Response,
        }
    }
}

pub type EventHandler = Box<dyn FnMut(&QueueEvent<'_>) + Send>;

/// One handler slot per event kind. Handlers run synchronously inside the
/// queue's processing step.
#[derive(Default)]
pub struct EventNotifier {
    idle: Option<EventHandler>,
    response: Option<EventHandler>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous handler.
    /// Returns `true` if a handler was replaced.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) -> bool {
        let slot = match kind {
            EventKind::Idle => &mut self.idle,
            EventKind::Response => &mut self.response,
        };
        slot.replace(handler).is_some()
    }

    pub fn fire(&mut self, event: &QueueEvent<'_>) {
        let slot = match event.kind() {
            EventKind::Idle => &mut self.idle,
            EventKind::Response => &mut self.response,
        };
        if let Some(handler) = slot {
            handler(event);
        }
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("idle", &self.idle.is_some())
            .field("response", &self.response.is_some())
            .finish()
    }
}
