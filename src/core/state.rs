use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Continuity memory of one pod, persisted as `universe_memory.json`.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct MemoryState {
    #[serde(default)]
    pub episodes: Vec<EpisodeSummary>,
    #[serde(default)]
    pub current_state: WorldState,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct WorldState {
    #[serde(default)]
    pub characters: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub title: String,
    pub summary: String,
}
