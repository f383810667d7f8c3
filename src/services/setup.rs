use anyhow::{anyhow, Result};
use inquire::Select;

use crate::core::config::ApiKeys;
use crate::core::error::PipelineError;
use crate::core::pod::{PodConfig, PodPaths};
use crate::services::llm::list_models;
use crate::services::tts::{list_voices, Voice};

const SKIP_OPTION: &str = "(skip, use default voice)";

fn require<'a>(key: Option<&'a str>, var: &str) -> Result<&'a str> {
    key.ok_or_else(|| PipelineError::Config(format!("{} not found in environment", var)).into())
}

pub fn format_voice(voice: &Voice) -> String {
    format!(
        "{} ({}) [{}]",
        voice.name,
        voice.voice_id,
        voice.category.as_deref().unwrap_or("unknown")
    )
}

pub async fn print_voices(keys: &ApiKeys) -> Result<()> {
    let api_key = require(keys.elevenlabs.as_deref(), "ELEVENLABS_API_KEY")?;
    println!("Fetching ElevenLabs voices...");
    let voices = list_voices(api_key).await?;
    for voice in &voices {
        println!("{}", format_voice(voice));
    }
    println!("{} voices available.", voices.len());
    Ok(())
}

pub async fn print_models(keys: &ApiKeys) -> Result<()> {
    let api_key = require(keys.google.as_deref(), "GOOGLE_API_KEY")?;
    println!("Fetching Gemini models...");
    let models = list_models(api_key).await?;
    for model in models.iter().filter(|m| m.generates_content_or_images()) {
        println!("{} {:?}", model.name, model.supported_generation_methods);
    }
    Ok(())
}

/// Names of characters that have no voice bound yet.
pub fn unbound_characters(pod: &PodConfig) -> Vec<String> {
    pod.characters
        .iter()
        .filter(|c| c.voice_id.as_deref().map_or(true, str::is_empty))
        .map(|c| c.name.clone())
        .collect()
}

/// Binds `voice_id` to `character`. Returns false if the character is unknown.
pub fn bind_voice(pod: &mut PodConfig, character: &str, voice_id: &str) -> bool {
    match pod.characters.iter_mut().find(|c| c.name == character) {
        Some(c) => {
            c.voice_id = Some(voice_id.to_string());
            true
        }
        None => false,
    }
}

/// Prompts for a voice for every character without one and saves the pod
/// configuration when anything changed.
pub async fn run_setup(paths: &PodPaths, keys: &ApiKeys) -> Result<()> {
    let config_file = paths.config_file();
    let mut pod = PodConfig::load(&config_file)?;

    let pending = unbound_characters(&pod);
    if pending.is_empty() {
        println!("Every character of '{}' already has a voice.", paths.name);
        return Ok(());
    }

    let api_key = require(keys.elevenlabs.as_deref(), "ELEVENLABS_API_KEY")?;
    println!("Fetching ElevenLabs voices...");
    let voices = list_voices(api_key).await?;
    if voices.is_empty() {
        return Err(anyhow!("No ElevenLabs voices available for this account"));
    }

    let mut needs_save = false;
    for name in pending {
        if let Some(voice_id) = select_voice(&format!("Select voice for {}:", name), &voices)? {
            needs_save |= bind_voice(&mut pod, &name, &voice_id);
        }
    }

    if needs_save {
        pod.save(&config_file)?;
        println!("Configuration saved to {}.", config_file.display());
    }
    Ok(())
}

fn select_voice(prompt: &str, voices: &[Voice]) -> Result<Option<String>> {
    let mut options: Vec<String> = voices.iter().map(format_voice).collect();
    options.push(SKIP_OPTION.to_string());

    let selection = Select::new(prompt, options).prompt()?;
    if selection == SKIP_OPTION {
        return Ok(None);
    }
    Ok(voices
        .iter()
        .find(|v| format_voice(v) == selection)
        .map(|v| v.voice_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod() -> PodConfig {
        serde_json::from_str(
            r#"{
                "system_prompt": "p",
                "video_duration_seconds": 30,
                "characters": [
                    { "name": "Tico", "voice_id": "v-tico", "personality": "curioso" },
                    { "name": "Luna" },
                    { "name": "Bruno", "voice_id": "" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_unbound_characters() {
        assert_eq!(unbound_characters(&pod()), vec!["Luna", "Bruno"]);
    }

    #[test]
    fn test_bind_voice_keeps_extra_fields() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.json");
        let mut pod = pod();

        assert!(bind_voice(&mut pod, "Luna", "v-luna"));
        assert!(!bind_voice(&mut pod, "Nadie", "v"));
        pod.save(&path)?;

        let reloaded = PodConfig::load(&path)?;
        assert_eq!(reloaded.voice_for("Luna"), Some("v-luna"));
        assert_eq!(reloaded.characters[0].extra["personality"], "curioso");
        Ok(())
    }

    #[test]
    fn test_format_voice() {
        let voice = Voice {
            name: "Adam".to_string(),
            voice_id: "pNInz6obpgDQGcFmaJgB".to_string(),
            category: None,
        };
        assert_eq!(format_voice(&voice), "Adam (pNInz6obpgDQGcFmaJgB) [unknown]");
    }

    #[tokio::test]
    async fn test_catalogues_need_keys() {
        let keys = ApiKeys::default();
        for err in [
            print_voices(&keys).await.unwrap_err(),
            print_models(&keys).await.unwrap_err(),
        ] {
            assert_eq!(PipelineError::find(&err).map(|e| e.kind()), Some("config"));
        }
    }
}
