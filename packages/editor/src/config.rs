use crate::errors::EditorError;
use atlas_graph::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "atlas.config.json";

/// Atlas editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Delta layers kept above the base before a graph is flattened
    #[serde(default = "default_max_layer_depth")]
    pub max_layer_depth: usize,

    /// Tag keys stripped from created and modified entities before upload
    #[serde(default = "default_discard_tags")]
    pub discard_tags: Vec<String>,

    /// Where the recovery log is written, relative to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_path: Option<String>,
}

fn default_max_layer_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_discard_tags() -> Vec<String> {
    [
        "created_by",
        "odbl",
        "odbl:note",
        "tiger:upload_uuid",
        "tiger:tlid",
        "tiger:source",
        "tiger:separated",
        "geobase:datasetName",
        "geobase:uuid",
        "sub_sea:type",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

impl EditorConfig {
    /// Load config from a directory
    pub fn load(cwd: &str) -> Result<Self, EditorError> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EditorConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(EditorConfig::default())
        }
    }

    /// Absolute path of the recovery log, if one is configured
    pub fn get_recovery_path(&self, cwd: &str) -> Option<PathBuf> {
        self.recovery_path.as_ref().map(|p| PathBuf::from(cwd).join(p))
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_layer_depth: default_max_layer_depth(),
            discard_tags: default_discard_tags(),
            recovery_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "maxLayerDepth": 8,
            "discardTags": ["created_by"],
            "recoveryPath": "recovery/session.json"
        }"#;

        let config: EditorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_layer_depth, 8);
        assert_eq!(config.discard_tags, vec!["created_by"]);
        assert_eq!(
            config.get_recovery_path("/work"),
            Some(PathBuf::from("/work/recovery/session.json"))
        );
    }

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.max_layer_depth, DEFAULT_MAX_DEPTH);
        assert!(config.discard_tags.contains(&"odbl".to_string()));
        assert_eq!(config.get_recovery_path("/work"), None);

        let partial: EditorConfig = serde_json::from_str(r#"{"maxLayerDepth": 4}"#).unwrap();
        assert_eq!(partial.discard_tags, config.discard_tags);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().to_str().unwrap();
        assert_eq!(EditorConfig::load(cwd).unwrap(), EditorConfig::default());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{"discardTags": []}"#).unwrap();
        let config = EditorConfig::load(cwd).unwrap();
        assert!(config.discard_tags.is_empty());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ not json").unwrap();
        assert!(matches!(EditorConfig::load(cwd), Err(EditorError::Json(_))));
    }
}
