//! # Edit history
//!
//! A stack of graph snapshots with a cursor.
//!
//! ## Design
//!
//! - `stack[0]` is the base graph and is never popped
//! - Every commit is all-or-nothing: availability, application and integrity
//!   are checked before the stack changes
//! - A new commit discards the redo branch
//! - Transient edits (drag in progress) are skipped by undo/redo and can be
//!   amended with `replace` or dropped with `pop`
//!
//! ## Example
//!
//! ```rust
//! use atlas_editor::{Action, History, MoveNode};
//! use atlas_graph::{EntityId, Graph, Loc, Node};
//!
//! let id = EntityId::node(1);
//! let mut history = History::new(Graph::new(vec![Node::new(id, [0.0, 0.0]).into()]));
//!
//! let action: Action = MoveNode::new(id, [1.0, 1.0]).into();
//! history.perform(&[action], Some("Moved a point")).unwrap();
//! assert_eq!(history.graph().node(id).unwrap().loc(), Loc::new(1.0, 1.0));
//!
//! history.undo();
//! assert_eq!(history.graph().node(id).unwrap().loc(), Loc::new(0.0, 0.0));
//! ```

use crate::actions::{Action, ActionOp, DiscardTags};
use crate::config::EditorConfig;
use crate::errors::EditorError;
use crate::events::{EventEmitter, EventKind, HistoryEvent, SubscriptionId};
use crate::integrity::{IntegrityEngine, SessionIds};
use atlas_graph::{Difference, Entity, EntityId, Graph, GraphResult, IdAllocator, Rebase, RebaseConflict};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// One entry of the history stack
#[derive(Debug, Clone)]
pub struct Edit {
    pub graph: Graph,
    pub annotation: Option<String>,
    /// Provisional edit, skipped by undo/redo
    pub transient: bool,
}

impl Edit {
    fn base(graph: Graph) -> Self {
        Self {
            graph,
            annotation: None,
            transient: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Checkpoint {
    stack: Vec<Edit>,
    index: usize,
}

/// Undo/redo history for one editing session
#[derive(Debug)]
pub struct History {
    stack: Vec<Edit>,
    index: usize,
    checkpoints: HashMap<String, Checkpoint>,
    events: EventEmitter,
    integrity: IntegrityEngine,
    config: EditorConfig,
    ids: IdAllocator,
    session_ids: SessionIds,
}

impl History {
    pub fn new(base: Graph) -> Self {
        Self::with_config(base, EditorConfig::default())
    }

    pub fn with_config(base: Graph, config: EditorConfig) -> Self {
        let base = base.base();
        Self {
            stack: vec![Edit::base(base)],
            index: 0,
            checkpoints: HashMap::new(),
            events: EventEmitter::new(),
            integrity: IntegrityEngine::new(),
            config,
            ids: IdAllocator::new(),
            session_ids: SessionIds::new(),
        }
    }

    /// Build the base graph from `entities` using the configured layer depth
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>, config: EditorConfig) -> Self {
        let base = Graph::new_base(entities, config.max_layer_depth);
        Self::with_config(base, config)
    }

    /// Replace the default integrity checks
    pub fn with_integrity(mut self, integrity: IntegrityEngine) -> Self {
        self.integrity = integrity;
        self
    }

    /// Rebuild a session from a saved stack. `stack[0]` must be the base.
    pub(crate) fn from_parts(stack: Vec<Edit>, index: usize, config: EditorConfig) -> Self {
        let mut history = Self {
            stack: Vec::new(),
            index,
            checkpoints: HashMap::new(),
            events: EventEmitter::new(),
            integrity: IntegrityEngine::new(),
            config,
            ids: IdAllocator::new(),
            session_ids: SessionIds::new(),
        };
        history.observe_stack(&stack);
        history.stack = stack;
        history
    }

    pub(crate) fn restore_parts(&mut self, stack: Vec<Edit>, index: usize, kind: EventKind) {
        let previous = self.graph().clone();
        self.observe_stack(&stack);
        self.stack = stack;
        self.index = index;

        info!(edits = self.stack.len() - 1, index, "Replaced edit stack");
        self.emit(kind, &previous, None);
    }

    pub fn graph(&self) -> &Graph {
        &self.stack[self.index].graph
    }

    pub fn base(&self) -> &Graph {
        &self.stack[0].graph
    }

    pub fn entity(&self, id: EntityId) -> GraphResult<&Arc<Entity>> {
        self.graph().entity(id)
    }

    pub fn has_entity(&self, id: EntityId) -> Option<&Arc<Entity>> {
        self.graph().has_entity(id)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn edits(&self) -> &[Edit] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.len() == 1
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Allocator for IDs of entities created in this session
    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    /// Apply `actions` as one undo step
    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    pub fn perform(&mut self, actions: &[Action], annotation: Option<&str>) -> Result<Difference, EditorError> {
        let graph = self.apply_all(self.graph(), actions)?;
        let annotation = annotation.map(str::to_string);
        info!(annotation = ?annotation, "Performed edit");
        Ok(self.push(graph, annotation, false))
    }

    /// Apply `actions` as a provisional edit that undo/redo skip over
    pub fn perform_transient(&mut self, actions: &[Action]) -> Result<Difference, EditorError> {
        let graph = self.apply_all(self.graph(), actions)?;
        debug!(actions = actions.len(), "Performed transient edit");
        Ok(self.push(graph, None, true))
    }

    /// Amend the top transient edit. An annotation commits it.
    pub fn replace(&mut self, actions: &[Action], annotation: Option<&str>) -> Result<Difference, EditorError> {
        if !self.top_is_transient() {
            return Err(EditorError::NotTransient);
        }

        let previous = self.graph().clone();
        let graph = self.apply_all(&previous, actions)?;
        let annotation = annotation.map(str::to_string);

        self.stack.truncate(self.index + 1);
        self.stack[self.index] = Edit {
            graph: graph.clone(),
            transient: annotation.is_none(),
            annotation: annotation.clone(),
        };

        let diff = Difference::new(&previous, &graph);
        self.session_ids.record(&diff);
        debug!(committed = annotation.is_some(), "Replaced transient edit");
        self.emit(EventKind::Change, &previous, annotation);
        Ok(diff)
    }

    /// Drop the top transient edit
    pub fn pop(&mut self) -> Result<Difference, EditorError> {
        if !self.top_is_transient() {
            return Err(EditorError::NotTransient);
        }

        let previous = self.graph().clone();
        self.stack.truncate(self.index);
        self.index -= 1;

        debug!(index = self.index, "Popped transient edit");
        self.emit(EventKind::Change, &previous, None);
        Ok(Difference::new(&previous, self.graph()))
    }

    /// Step back to the previous committed edit (or the base)
    pub fn undo(&mut self) -> Difference {
        if self.index == 0 {
            return Difference::default();
        }

        let previous = self.graph().clone();
        let annotation = self.stack[self.index].annotation.clone();
        self.index -= 1;
        while self.index > 0 && self.stack[self.index].transient {
            self.index -= 1;
        }

        info!(index = self.index, annotation = ?annotation, "Undo");
        self.emit(EventKind::Undone, &previous, annotation);
        Difference::new(&previous, self.graph())
    }

    /// Step forward to the next committed edit (or the tip)
    pub fn redo(&mut self) -> Difference {
        let tip = self.stack.len() - 1;
        if self.index == tip {
            return Difference::default();
        }

        let previous = self.graph().clone();
        self.index += 1;
        while self.index < tip && self.stack[self.index].transient {
            self.index += 1;
        }

        let annotation = self.stack[self.index].annotation.clone();
        info!(index = self.index, annotation = ?annotation, "Redo");
        self.emit(EventKind::Redone, &previous, annotation);
        Difference::new(&previous, self.graph())
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.stack.len()
    }

    /// Annotation of the edit `undo` would revert
    pub fn undo_annotation(&self) -> Option<&str> {
        self.stack[1..=self.index]
            .iter()
            .rev()
            .find_map(|edit| edit.annotation.as_deref())
    }

    /// Annotation of the edit `redo` would re-apply
    pub fn redo_annotation(&self) -> Option<&str> {
        self.stack[self.index + 1..]
            .iter()
            .find_map(|edit| edit.annotation.as_deref())
    }

    pub fn checkpoint(&mut self, name: impl Into<String>) {
        let name = name.into();
        debug!(name = %name, index = self.index, "Saved checkpoint");
        self.checkpoints.insert(
            name,
            Checkpoint {
                stack: self.stack.clone(),
                index: self.index,
            },
        );
    }

    pub fn restore_checkpoint(&mut self, name: &str) -> Result<Difference, EditorError> {
        let checkpoint = self
            .checkpoints
            .get(name)
            .cloned()
            .ok_or_else(|| EditorError::UnknownCheckpoint(name.to_string()))?;

        let previous = self.graph().clone();
        self.stack = checkpoint.stack;
        self.index = checkpoint.index;

        info!(name, index = self.index, "Restored checkpoint");
        self.emit(EventKind::Restored, &previous, None);
        Ok(Difference::new(&previous, self.graph()))
    }

    /// Drop every edit, back to the base
    pub fn reset(&mut self) -> Difference {
        let previous = self.graph().clone();
        self.stack.truncate(1);
        self.index = 0;

        info!("Reset history");
        self.emit(EventKind::Change, &previous, None);
        Difference::new(&previous, self.graph())
    }

    /// Merge fetched entities into the base under every edit and checkpoint
    #[instrument(skip(self, entities))]
    pub fn rebase(&mut self, entities: impl IntoIterator<Item = Entity>, force: bool) -> Vec<RebaseConflict> {
        let previous = self.graph().clone();
        let rebase = Rebase::new(self.base(), entities, force);

        let mut conflicts = Vec::new();
        for edit in self.stack.iter_mut() {
            let (graph, mut found) = rebase.apply(&edit.graph);
            edit.graph = graph;
            conflicts.append(&mut found);
        }
        for checkpoint in self.checkpoints.values_mut() {
            for edit in checkpoint.stack.iter_mut() {
                edit.graph = rebase.apply(&edit.graph).0;
            }
        }

        conflicts.sort();
        conflicts.dedup();
        for conflict in &conflicts {
            warn!(conflict = %conflict, "Rebase conflict");
        }

        info!(fetched = rebase.fetched().len(), conflicts = conflicts.len(), "Rebased history");
        self.emit(EventKind::Change, &previous, None);
        conflicts
    }

    /// Everything changed since the base
    pub fn difference(&self) -> Difference {
        Difference::new(self.base(), self.graph())
    }

    pub fn has_changes(&self) -> bool {
        !self.difference().is_empty()
    }

    /// Changes since the base, as they would be after also applying `action`
    pub fn changes(&self, action: Option<&Action>) -> Result<Difference, EditorError> {
        match action {
            Some(action) => {
                let head = action.apply(self.graph())?;
                Ok(Difference::new(self.base(), &head))
            }
            None => Ok(self.difference()),
        }
    }

    /// Changes ready for upload, with the configured tags discarded
    pub fn upload_changes(&self) -> Result<Difference, EditorError> {
        let discard = DiscardTags::for_difference(&self.difference(), &self.config.discard_tags);
        self.changes(Some(&Action::from(discard)))
    }

    pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&HistoryEvent) + 'static) -> SubscriptionId {
        self.events.on(kind, handler)
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.events.off(id)
    }

    fn top_is_transient(&self) -> bool {
        self.index > 0 && self.stack[self.index].transient
    }

    fn apply_all(&self, start: &Graph, actions: &[Action]) -> Result<Graph, EditorError> {
        for action in actions {
            if let Some(reason) = action.disabled(start) {
                debug!(action = action.name(), reason = %reason, "Action disabled");
                return Err(EditorError::Disabled {
                    action: action.name(),
                    reason,
                });
            }
        }

        let mut graph = start.clone();
        for action in actions {
            graph = action.apply(&graph).map_err(|e| {
                error!(action = action.name(), error = %e, "Action failed");
                EditorError::Action(e)
            })?;
        }

        let violations = self.integrity.check_session(start, &graph, &self.session_ids);
        if !violations.is_empty() {
            error!(count = violations.len(), first = %violations[0], "Edit rejected");
            return Err(EditorError::Invariant(violations));
        }
        Ok(graph)
    }

    fn push(&mut self, graph: Graph, annotation: Option<String>, transient: bool) -> Difference {
        let previous = self.graph().clone();
        self.stack.truncate(self.index + 1);
        self.stack.push(Edit {
            graph,
            annotation: annotation.clone(),
            transient,
        });
        self.index += 1;

        let diff = Difference::new(&previous, self.graph());
        self.session_ids.record(&diff);
        self.emit(EventKind::Change, &previous, annotation);
        diff
    }

    /// Seed the ID allocator and the session ledger from a restored stack
    fn observe_stack(&mut self, stack: &[Edit]) {
        for edit in stack {
            for id in edit.graph.local_ids() {
                self.ids.observe(&id);
            }
        }
        for pair in stack.windows(2) {
            self.session_ids.record(&Difference::new(&pair[0].graph, &pair[1].graph));
        }
    }

    fn emit(&mut self, kind: EventKind, previous: &Graph, annotation: Option<String>) {
        let event = HistoryEvent {
            kind,
            current: self.graph().clone(),
            previous: previous.clone(),
            annotation,
        };
        self.events.emit(&event);
    }
}
