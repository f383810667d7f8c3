use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::core::error::PipelineError;

pub const SETTINGS_FILE: &str = "settings.yml";

/// Run-wide constants. Loaded once and handed to every stage at construction.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub pods_dir: String,
    pub default_pod: String,
    pub default_topic: String,

    // --- LLM ---
    pub script_model: String,
    pub image_model: String,

    // --- TTS ---
    pub default_voice_id: String,
    pub tts_model_id: String,
    pub tts_stability: f32,
    pub tts_similarity_boost: f32,
    /// Local speech synthesizer used in mock mode. Empty disables it.
    pub local_tts_command: String,

    // --- Visuals ---
    pub mock_visuals: bool,
    pub generative_mock_images: bool,

    // --- Video ---
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub video_fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub audio_padding_seconds: f64,
    pub default_scene_seconds: f64,
    pub zoom_rate: f64,

    // --- Memory ---
    pub summary_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pods_dir: "pods".to_string(),
            default_pod: "kids_story".to_string(),
            default_topic: "Tico aprende a compartir sus juguetes".to_string(),
            script_model: "gemini-3-pro-preview".to_string(),
            image_model: "imagen-3.0-generate-002".to_string(),
            default_voice_id: "nPczCjzI2devNBz1zQrb".to_string(),
            tts_model_id: "eleven_multilingual_v2".to_string(),
            tts_stability: 0.5,
            tts_similarity_boost: 0.75,
            local_tts_command: "say".to_string(),
            mock_visuals: true,
            generative_mock_images: true,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            video_fps: 24,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            canvas_width: 1280,
            canvas_height: 720,
            audio_padding_seconds: 0.5,
            default_scene_seconds: 5.0,
            zoom_rate: 0.05,
            summary_window: 5,
        }
    }
}

impl Settings {
    /// Loads `settings.yml` from the working directory, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = serde_yaml_ng::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(settings)
    }
}

/// Provider credentials, read from the environment once per run.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub google: Option<String>,
    pub elevenlabs: Option<String>,
    pub sjinn: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            google: read_key("GOOGLE_API_KEY", "your_google_api_key_here"),
            elevenlabs: read_key("ELEVENLABS_API_KEY", "your_elevenlabs_api_key_here"),
            sjinn: read_key("SJINN_API_KEY", "your_sjinn_api_key_here"),
        }
    }
}

fn read_key(var: &str, placeholder: &str) -> Option<String> {
    normalize_key(env::var(var).ok(), placeholder)
}

/// Placeholder sentinels count as missing.
pub fn normalize_key(value: Option<String>, placeholder: &str) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != placeholder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(None, "x"), None);
        assert_eq!(normalize_key(Some("".into()), "x"), None);
        assert_eq!(normalize_key(Some("  ".into()), "x"), None);
        assert_eq!(
            normalize_key(Some("your_elevenlabs_api_key_here".into()), "your_elevenlabs_api_key_here"),
            None
        );
        assert_eq!(normalize_key(Some("sk-123".into()), "x").as_deref(), Some("sk-123"));
    }

    #[test]
    fn test_missing_settings_file_uses_defaults() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let settings = Settings::load_from(&temp_dir.path().join("settings.yml"))?;
        assert_eq!(settings.video_fps, 24);
        assert_eq!(settings.default_pod, "kids_story");
        assert!(settings.mock_visuals);
        Ok(())
    }

    #[test]
    fn test_partial_settings_override() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("settings.yml");
        fs::write(&path, "video_fps: 30\nmock_visuals: false\n")?;

        let settings = Settings::load_from(&path)?;
        assert_eq!(settings.video_fps, 30);
        assert!(!settings.mock_visuals);
        assert_eq!(settings.video_codec, "libx264");
        Ok(())
    }

    #[test]
    fn test_malformed_settings_is_config_error() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("settings.yml");
        fs::write(&path, "video_fps: [not a number")?;

        let err = Settings::load_from(&path).unwrap_err();
        assert_eq!(PipelineError::find(&err).map(|e| e.kind()), Some("config"));
        Ok(())
    }
}
