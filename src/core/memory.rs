//! Continuity memory shared by every episode of a pod.
//!
//! The whole state is read, mutated and written back on each change. Two runs
//! against the same pod at once are not coordinated; the last writer wins.

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::PipelineError;
use crate::core::io::Storage;
use crate::core::state::{EpisodeSummary, MemoryState};

pub const FIRST_EPISODE_CONTEXT: &str = "Este es el primer episodio. No hay historia previa.";

pub struct MemoryStore {
    path: PathBuf,
    storage: Arc<dyn Storage>,
    window: usize,
}

impl MemoryStore {
    /// Opens the memory file, creating and persisting an empty state if it is missing.
    pub async fn open(path: impl Into<PathBuf>, storage: Arc<dyn Storage>, window: usize) -> Result<Self> {
        let store = Self {
            path: path.into(),
            storage,
            window,
        };
        store.ensure_initialized().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_initialized(&self) -> Result<()> {
        let exists = self
            .storage
            .exists(&self.path)
            .await
            .map_err(|e| storage_error("checking", &self.path, e))?;
        if !exists {
            info!("Initializing empty memory at {}", self.path.display());
            self.save(&MemoryState::default()).await?;
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<MemoryState> {
        self.ensure_initialized().await?;
        let bytes = self
            .storage
            .read(&self.path)
            .await
            .map_err(|e| storage_error("reading", &self.path, e))?;
        let state = serde_json::from_slice(&bytes)
            .map_err(|e| storage_error("decoding", &self.path, e.into()))?;
        Ok(state)
    }

    pub async fn save(&self, state: &MemoryState) -> Result<()> {
        let content = to_json(state).map_err(|e| storage_error("encoding", &self.path, e))?;
        self.storage
            .write(&self.path, &content)
            .await
            .map_err(|e| storage_error("writing", &self.path, e))?;
        Ok(())
    }

    /// Appends one episode. Call only after the episode's video exists.
    pub async fn add_episode(&self, episode: EpisodeSummary) -> Result<()> {
        let mut state = self.load().await?;
        state.episodes.push(episode);
        debug!("Memory now holds {} episodes", state.episodes.len());
        self.save(&state).await
    }

    pub async fn context_summary(&self) -> Result<String> {
        let state = self.load().await?;
        Ok(summarize(&state, self.window))
    }
}

/// Synopsis of the most recent `window` episodes, oldest first.
pub fn summarize(state: &MemoryState, window: usize) -> String {
    if state.episodes.is_empty() {
        return FIRST_EPISODE_CONTEXT.to_string();
    }

    let start = state.episodes.len().saturating_sub(window);
    let mut context = String::from("Resumen de episodios anteriores:\n");
    for (i, episode) in state.episodes[start..].iter().enumerate() {
        let summary = if episode.summary.is_empty() {
            "Sin resumen"
        } else {
            episode.summary.as_str()
        };
        context.push_str(&format!("- Episodio {}: {}\n", i + 1, summary));
    }
    context
}

fn to_json(state: &MemoryState) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    state.serialize(&mut ser)?;
    Ok(buf)
}

fn storage_error(action: &str, path: &Path, err: anyhow::Error) -> anyhow::Error {
    PipelineError::Storage(format!("{} {}: {:#}", action, path.display(), err)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use async_trait::async_trait;

    fn episode(n: usize) -> EpisodeSummary {
        EpisodeSummary {
            title: format!("Episodio {}", n),
            summary: format!("Pasa la cosa {}", n),
        }
    }

    #[tokio::test]
    async fn test_open_initializes_empty_state() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("universe_memory.json");
        let store = MemoryStore::open(&path, Arc::new(NativeStorage::new()), 5).await?;

        assert!(path.exists());
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["episodes"], serde_json::json!([]));
        assert_eq!(raw["current_state"]["characters"], serde_json::json!({}));

        assert_eq!(store.context_summary().await?, FIRST_EPISODE_CONTEXT);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_does_not_reset() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("universe_memory.json");
        let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());

        let store = MemoryStore::open(&path, storage.clone(), 5).await?;
        store.add_episode(episode(1)).await?;

        let reopened = MemoryStore::open(&path, storage, 5).await?;
        assert_eq!(reopened.load().await?.episodes, vec![episode(1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_episode_appends_one() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = MemoryStore::open(
            temp_dir.path().join("universe_memory.json"),
            Arc::new(NativeStorage::new()),
            5,
        )
        .await?;

        for n in 1..=3 {
            let before = store.load().await?.episodes.len();
            store.add_episode(episode(n)).await?;
            let after = store.load().await?.episodes;
            assert_eq!(after.len(), before + 1);
            assert_eq!(after.last(), Some(&episode(n)));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_save_load_preserves_state() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let store = MemoryStore::open(
            temp_dir.path().join("universe_memory.json"),
            Arc::new(NativeStorage::new()),
            5,
        )
        .await?;

        let mut state = MemoryState::default();
        state.episodes = vec![episode(1), episode(2)];
        state
            .current_state
            .characters
            .insert("Tico".to_string(), serde_json::json!({ "mood": "feliz", "nueces": 3 }));
        store.save(&state).await?;

        assert_eq!(store.load().await?, state);
        Ok(())
    }

    #[test]
    fn test_summary_keeps_last_five_in_order() {
        let mut state = MemoryState::default();
        state.episodes = (1..=7).map(episode).collect();

        let summary = summarize(&state, 5);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Resumen de episodios anteriores:");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "- Episodio 1: Pasa la cosa 3");
        assert_eq!(lines[5], "- Episodio 5: Pasa la cosa 7");
    }

    #[test]
    fn test_summary_with_fewer_than_window() {
        let mut state = MemoryState::default();
        state.episodes = vec![
            episode(1),
            EpisodeSummary {
                title: "Sin datos".to_string(),
                summary: String::new(),
            },
        ];

        assert_eq!(
            summarize(&state, 5),
            "Resumen de episodios anteriores:\n- Episodio 1: Pasa la cosa 1\n- Episodio 2: Sin resumen\n"
        );
    }

    #[tokio::test]
    async fn test_non_ascii_written_literally() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("universe_memory.json");
        let store = MemoryStore::open(&path, Arc::new(NativeStorage::new()), 5).await?;
        store
            .add_episode(EpisodeSummary {
                title: "La nuez mágica".to_string(),
                summary: "Tico comparte".to_string(),
            })
            .await?;

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("La nuez mágica"));
        assert!(raw.contains("\n    \"episodes\""));
        Ok(())
    }

    struct BrokenStorage;

    #[async_trait]
    impl Storage for BrokenStorage {
        async fn read(&self, _path: &Path) -> Result<Vec<u8>> {
            Err(anyhow::anyhow!("disk on fire"))
        }
        async fn write(&self, _path: &Path, _content: &[u8]) -> Result<()> {
            Err(anyhow::anyhow!("disk on fire"))
        }
        async fn exists(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_io_failure_is_storage_error() -> Result<()> {
        let store = MemoryStore::open("universe_memory.json", Arc::new(BrokenStorage), 5).await?;

        let err = store.context_summary().await.unwrap_err();
        assert_eq!(PipelineError::find(&err).map(|e| e.kind()), Some("storage"));

        let err = store.add_episode(episode(1)).await.unwrap_err();
        assert_eq!(PipelineError::find(&err).map(|e| e.kind()), Some("storage"));
        Ok(())
    }
}
