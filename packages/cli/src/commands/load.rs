use anyhow::{Context, Result};
use atlas_editor::{EditorConfig, History};
use atlas_graph::{Entity, Graph};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A base extract plus the recovery log of a session edited over it
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// JSON array of base entities
    pub base: PathBuf,

    /// Recovery log written by the editor
    pub recovery: PathBuf,
}

pub fn load_entities(path: &Path) -> Result<Vec<Entity>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let entities: Vec<Entity> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of entities", path.display()))?;
    debug!(path = %path.display(), count = entities.len(), "Loaded entities");
    Ok(entities)
}

pub fn load_base(path: &Path, config: &EditorConfig) -> Result<Graph> {
    Ok(Graph::new_base(load_entities(path)?, config.max_layer_depth))
}

pub fn load_config(cwd: &str) -> Result<EditorConfig> {
    EditorConfig::load(cwd).with_context(|| format!("Failed to load config from {cwd}"))
}

pub fn load_session(args: &SessionArgs, config: EditorConfig) -> Result<History> {
    let base = load_base(&args.base, &config)?;
    let json = fs::read_to_string(&args.recovery)
        .with_context(|| format!("Failed to read {}", args.recovery.display()))?;
    History::from_json(&base, &json, config)
        .with_context(|| format!("Cannot restore {}", args.recovery.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use atlas_editor::{Action, History, MoveNode};
    use atlas_graph::{tags, Entity, EntityId, Node, Way};
    use std::path::{Path, PathBuf};

    pub const BASE: &str = r#"[
        {"type": "node", "id": "n1", "loc": {"lon": 0.0, "lat": 0.0}},
        {"type": "node", "id": "n2", "loc": {"lon": 1.0, "lat": 0.0}},
        {"type": "node", "id": "n3", "loc": {"lon": 2.0, "lat": 0.0}},
        {"type": "way", "id": "w1", "tags": {"highway": "residential"}, "nodes": ["n1", "n2", "n3"]}
    ]"#;

    /// Write `base.json` and a recovery log with a move and a new tagged way
    pub fn session(dir: &Path) -> (PathBuf, PathBuf) {
        let base_path = dir.join("base.json");
        std::fs::write(&base_path, BASE).unwrap();

        let entities: Vec<Entity> = serde_json::from_str(BASE).unwrap();
        let mut history = History::from_entities(entities, Default::default());
        let moved: Action = MoveNode::new(EntityId::node(2), [1.0, 1.0]).into();
        history.perform(&[moved], Some("Moved a node")).unwrap();

        let node = Node::new(EntityId::node(-1), [3.0, 0.0]);
        let way = Way::new(EntityId::way(-1), vec![EntityId::node(3), EntityId::node(-1)])
            .with_tags(tags([("highway", "path"), ("created_by", "atlas")]));
        history
            .perform(
                &[
                    atlas_editor::AddEntity::new(node).into(),
                    atlas_editor::AddEntity::new(way).into(),
                ],
                Some("Added a line"),
            )
            .unwrap();

        let recovery_path = dir.join("recovery.json");
        std::fs::write(&recovery_path, history.to_json().unwrap()).unwrap();
        (base_path, recovery_path)
    }
}
