pub mod elevenlabs;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::path::Path;

use crate::core::config::{ApiKeys, Settings};

pub use elevenlabs::{list_voices, ElevenLabsClient, Voice};
pub use local::LocalSpeechClient;

/// Placeholder body written when no speech backend produced a file.
pub const MOCK_AUDIO_CONTENT: &[u8] = b"Mock Audio Content";

#[async_trait]
pub trait TtsClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes the narration of `text` spoken by `voice_id` to `output`.
    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationMode {
    /// ElevenLabs, when a key is configured.
    Primary,
    /// Local speech command, or a marker file.
    Mock,
}

pub fn select_narration_mode(keys: &ApiKeys) -> NarrationMode {
    if keys.elevenlabs.is_some() {
        NarrationMode::Primary
    } else {
        NarrationMode::Mock
    }
}

pub fn create_tts_client(settings: &Settings, keys: &ApiKeys) -> Box<dyn TtsClient> {
    match (select_narration_mode(keys), keys.elevenlabs.as_deref()) {
        (NarrationMode::Primary, Some(api_key)) => {
            info!("Narration provider: ElevenLabs ({})", settings.tts_model_id);
            Box::new(ElevenLabsClient::new(api_key, settings))
        }
        _ => {
            warn!("ELEVENLABS_API_KEY not set. Using local mock narration.");
            Box::new(LocalSpeechClient::new(&settings.local_tts_command))
        }
    }
}

pub(crate) async fn write_mock_audio(output: &Path) -> Result<()> {
    tokio::fs::write(output, MOCK_AUDIO_CONTENT).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_key_presence() {
        assert_eq!(select_narration_mode(&ApiKeys::default()), NarrationMode::Mock);

        let keys = ApiKeys {
            elevenlabs: Some("xi".to_string()),
            ..Default::default()
        };
        assert_eq!(select_narration_mode(&keys), NarrationMode::Primary);
        assert_eq!(create_tts_client(&Settings::default(), &keys).name(), "ElevenLabs");
        assert_eq!(
            create_tts_client(&Settings::default(), &ApiKeys::default()).name(),
            "local"
        );
    }
}
