use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::PipelineError;

pub const POD_CONFIG_FILE: &str = "config.json";
pub const MEMORY_FILE: &str = "universe_memory.json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PodConfig {
    pub system_prompt: String,
    pub video_duration_seconds: u32,
    #[serde(default)]
    pub consistency: Consistency,
    #[serde(default)]
    pub characters: Vec<Character>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Consistency {
    #[serde(default)]
    pub art_style_lora: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Character {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Free-form descriptive fields, echoed to the script prompt as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PodConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "No configuration found for pod at {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: PodConfig = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Exact-name voice binding for a speaker, if the pod declares one.
    pub fn voice_for(&self, speaker: &str) -> Option<&str> {
        self.characters
            .iter()
            .find(|c| c.name == speaker)
            .and_then(|c| c.voice_id.as_deref())
            .filter(|v| !v.is_empty())
    }
}

/// Filesystem layout of one pod: `<pods_dir>/<name>/{config.json, universe_memory.json, assets/, output/}`.
#[derive(Debug, Clone)]
pub struct PodPaths {
    pub name: String,
    pub root: PathBuf,
}

impl PodPaths {
    pub fn new(pods_dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: pods_dir.as_ref().join(name),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(POD_CONFIG_FILE)
    }

    pub fn memory_file(&self) -> PathBuf {
        self.root.join(MEMORY_FILE)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }
}

/// Replaces path separators so a character name can be embedded in a file name.
pub fn file_component(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}
