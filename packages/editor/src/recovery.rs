//! # Recovery log
//!
//! Serializes the edit stack so a crashed session can be restored over a
//! freshly loaded base.
//!
//! Each distinct entity value is stored once under the key `<id>v<version>`;
//! every edit lists the keys it layers over the base plus the IDs it deletes.
//! `base_entities` carries the base value of every locally touched entity so
//! edits still resolve when the new base was loaded with a smaller extent.

use crate::config::EditorConfig;
use crate::errors::EditorError;
use crate::events::EventKind;
use crate::history::{Edit, History};
use atlas_graph::{Entity, EntityId, Graph, IdSet, Rebase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const RECOVERY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEdit {
    /// Entity keys layered over the base
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub deleted: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default)]
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryLog {
    pub version: u32,
    /// Opaque marker of the data the base was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_token: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub entities: Vec<Entity>,
    pub base_entities: Vec<Entity>,
    pub stack: Vec<RecoveryEdit>,
    pub index: usize,
}

/// Key under which an entity value is stored
pub fn entity_key(entity: &Entity) -> String {
    format!("{}v{}", entity.id(), entity.version())
}

impl RecoveryLog {
    pub fn capture(history: &History) -> Self {
        let base = history.base();
        let mut entities: BTreeMap<String, Arc<Entity>> = BTreeMap::new();
        let mut touched = IdSet::new();
        let mut stack = Vec::with_capacity(history.len());

        for edit in history.edits() {
            let mut locals: Vec<_> = edit.graph.local_entries().into_iter().collect();
            locals.sort_by_key(|(id, _)| *id);

            let mut modified = Vec::new();
            let mut deleted = Vec::new();
            for (id, slot) in locals {
                touched.insert(id);
                match slot {
                    Some(entity) => {
                        let key = entity_key(&entity);
                        modified.push(key.clone());
                        entities.entry(key).or_insert(entity);
                    }
                    None => deleted.push(id),
                }
            }

            stack.push(RecoveryEdit {
                modified,
                deleted,
                annotation: edit.annotation.clone(),
                transient: edit.transient,
            });
        }

        let base_entities = touched
            .iter()
            .filter_map(|id| base.has_entity(*id))
            .map(|e| Entity::clone(e))
            .collect();

        Self {
            version: RECOVERY_VERSION,
            base_token: None,
            timestamp: Utc::now(),
            entities: entities.into_values().map(|e| Entity::clone(&e)).collect(),
            base_entities,
            stack,
            index: history.index(),
        }
    }

    pub fn with_base_token(mut self, token: impl Into<String>) -> Self {
        self.base_token = Some(token.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let log: RecoveryLog = serde_json::from_str(json)?;
        if log.version != RECOVERY_VERSION {
            return Err(EditorError::Recovery(format!(
                "unsupported recovery log version {}",
                log.version
            )));
        }
        Ok(log)
    }

    pub fn read(path: &Path) -> Result<Self, EditorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn write(&self, path: &Path) -> Result<(), EditorError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rebuild the edit stack over `base`
    pub(crate) fn restore_stack(&self, base: &Graph) -> Result<(Vec<Edit>, usize), EditorError> {
        if self.stack.is_empty() {
            return Err(EditorError::Recovery("empty edit stack".to_string()));
        }
        if self.index >= self.stack.len() {
            return Err(EditorError::Recovery(format!(
                "index {} outside a stack of {}",
                self.index,
                self.stack.len()
            )));
        }

        // the loaded base is fresher than the log; only fill in what it lacks
        let missing: Vec<Entity> = self
            .base_entities
            .iter()
            .filter(|e| base.has_entity(e.id()).is_none())
            .cloned()
            .collect();
        let skipped = self.base_entities.len() - missing.len();
        if skipped > 0 {
            debug!(skipped, "Base already holds some recovered base entities");
        }
        let base = Rebase::new(base, missing, false).base().clone();

        let entities: HashMap<String, Arc<Entity>> = self
            .entities
            .iter()
            .map(|e| (entity_key(e), Arc::new(e.clone())))
            .collect();

        let mut stack = Vec::with_capacity(self.stack.len());
        for (position, saved) in self.stack.iter().enumerate() {
            if position == 0 {
                stack.push(Edit {
                    graph: base.clone(),
                    annotation: None,
                    transient: false,
                });
                continue;
            }

            let graph = base.try_update(|u| -> Result<(), EditorError> {
                for key in &saved.modified {
                    let entity = entities
                        .get(key)
                        .ok_or_else(|| EditorError::Recovery(format!("unknown entity key {key}")))?;
                    u.replace_shared(Arc::clone(entity));
                }
                for id in &saved.deleted {
                    u.remove(*id);
                }
                Ok(())
            })?;

            stack.push(Edit {
                graph,
                annotation: saved.annotation.clone(),
                transient: saved.transient,
            });
        }
        Ok((stack, self.index))
    }
}

impl History {
    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(&RecoveryLog::capture(self))?)
    }

    /// Restore a session saved with [`History::to_json`] over `base`
    pub fn from_json(base: &Graph, json: &str, config: EditorConfig) -> Result<Self, EditorError> {
        let log = RecoveryLog::from_json(json)?;
        let (stack, index) = log.restore_stack(&base.base())?;
        info!(edits = stack.len() - 1, index, "Restored history from recovery log");
        Ok(History::from_parts(stack, index, config))
    }

    /// Replace this session's edits with a saved log; emits `Restored`
    pub fn restore_json(&mut self, json: &str) -> Result<(), EditorError> {
        let log = RecoveryLog::from_json(json)?;
        let (stack, index) = log.restore_stack(self.base()).inspect_err(|e| {
            warn!(error = %e, "Discarding unusable recovery log");
        })?;
        self.restore_parts(stack, index, EventKind::Restored);
        Ok(())
    }

    /// Write the recovery log to the configured path under `cwd`
    pub fn save_recovery(&self, cwd: &str) -> Result<Option<std::path::PathBuf>, EditorError> {
        let Some(path) = self.config().get_recovery_path(cwd) else {
            return Ok(None);
        };
        RecoveryLog::capture(self).write(&path)?;
        debug!(path = %path.display(), "Saved recovery log");
        Ok(Some(path))
    }
}
