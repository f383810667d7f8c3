use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::pod::{file_component, PodConfig};
use crate::services::script::Script;
use crate::services::tts::TtsClient;

/// Narration files keyed by scene index. Silent scenes have no entry.
pub type AudioPaths = BTreeMap<usize, PathBuf>;

pub struct NarrationStage<'a> {
    pod: &'a PodConfig,
    default_voice: &'a str,
    assets_dir: PathBuf,
    tts: &'a dyn TtsClient,
}

impl<'a> NarrationStage<'a> {
    pub fn new(
        pod: &'a PodConfig,
        default_voice: &'a str,
        assets_dir: PathBuf,
        tts: &'a dyn TtsClient,
    ) -> Result<Self> {
        std::fs::create_dir_all(&assets_dir)
            .with_context(|| format!("Failed to create {}", assets_dir.display()))?;
        Ok(Self {
            pod,
            default_voice,
            assets_dir,
            tts,
        })
    }

    pub fn file_name(index: usize, character: &str) -> String {
        format!("audio_{:03}_{}.mp3", index + 1, file_component(character))
    }

    /// Characters without a bound voice, and unknown speakers, use the default voice.
    pub fn voice_for(&self, character: &str) -> &str {
        self.pod.voice_for(character).unwrap_or(self.default_voice)
    }

    /// Scenes are narrated in order. A provider error aborts the stage.
    pub async fn generate(&self, script: &Script) -> Result<AudioPaths> {
        let mut paths = AudioPaths::new();
        for (i, scene) in script.scenes.iter().enumerate() {
            if scene.audio_text.trim().is_empty() {
                continue;
            }
            let voice_id = self.voice_for(&scene.character);
            let output = self.assets_dir.join(Self::file_name(i, &scene.character));
            info!(
                "Narrating scene {} as {} with {} voice {}",
                i + 1,
                scene.character,
                self.tts.name(),
                voice_id
            );
            self.tts
                .synthesize(&scene.audio_text, voice_id, &output)
                .await
                .with_context(|| format!("Narration failed for scene {}", i + 1))?;
            paths.insert(i, output);
        }
        Ok(paths)
    }
}
