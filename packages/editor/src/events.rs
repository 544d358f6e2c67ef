//! History change notifications

use atlas_graph::Graph;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// perform, replace, pop, reset, rebase
    Change,
    Undone,
    Redone,
    /// A checkpoint or a recovery log was restored
    Restored,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Change => "change",
            EventKind::Undone => "undone",
            EventKind::Redone => "redone",
            EventKind::Restored => "restored",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub kind: EventKind,
    pub current: Graph,
    pub previous: Graph,
    /// Annotation of the edit performed, undone or redone
    pub annotation: Option<String>,
}

/// Handle returned by [`EventEmitter::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&HistoryEvent)>;

/// Handlers keyed by event kind, called in subscription order
#[derive(Default)]
pub struct EventEmitter {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventKind, Handler)>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&HistoryEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, kind, Box::new(handler)));
        id
    }

    /// Returns false when `id` was not subscribed
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _, _)| *sub != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &HistoryEvent) {
        for (_, kind, handler) in self.handlers.iter_mut() {
            if *kind == event.kind {
                handler(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
