use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::TtsClient;
use crate::core::config::Settings;
use crate::core::error::PipelineError;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";

pub struct ElevenLabsClient {
    api_key: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsClient {
    pub fn new(api_key: &str, settings: &Settings) -> Self {
        Self {
            api_key: api_key.to_string(),
            model_id: settings.tts_model_id.clone(),
            stability: settings.tts_stability,
            similarity_boost: settings.tts_similarity_boost,
            client: reqwest::Client::new(),
        }
    }

    fn build_request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        }
    }
}

#[async_trait]
impl TtsClient for ElevenLabsClient {
    fn name(&self) -> &'static str {
        "ElevenLabs"
    }

    async fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<()> {
        let url = format!("{}/text-to-speech/{}", ELEVENLABS_API_BASE, voice_id);
        let resp = self
            .client
            .post(url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .context("Failed to reach ElevenLabs")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Error {}: {}", status.as_u16(), body);
            return Err(PipelineError::Provider {
                provider: "ElevenLabs",
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let mut file = tokio::fs::File::create(output)
            .await
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut stream = resp.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Audio stream interrupted")?;
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        debug!("Wrote {} bytes of narration to {}", written, output.display());
        Ok(())
    }
}

// --- Voice catalogue ---

#[derive(Debug, Deserialize, Clone)]
pub struct Voice {
    pub name: String,
    pub voice_id: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Deserialize)]
struct VoiceList {
    #[serde(default)]
    voices: Vec<Voice>,
}

pub async fn list_voices(api_key: &str) -> Result<Vec<Voice>> {
    let resp = reqwest::Client::new()
        .get(format!("{}/voices", ELEVENLABS_API_BASE))
        .header("xi-api-key", api_key)
        .send()
        .await
        .context("Failed to reach ElevenLabs")?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::Provider {
            provider: "ElevenLabs",
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        }
        .into());
    }

    let list: VoiceList = resp.json().await?;
    Ok(list.voices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let client = ElevenLabsClient::new("xi", &Settings::default());
        let body = serde_json::to_value(client.build_request("Hola Tico")).unwrap();

        assert_eq!(body["text"], "Hola Tico");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["stability"], 0.5);
        assert_eq!(body["voice_settings"]["similarity_boost"], 0.75);
    }

    #[test]
    fn test_voice_list_decode() {
        let list: VoiceList = serde_json::from_str(
            r#"{ "voices": [
                { "name": "Adam", "voice_id": "pNInz6obpgDQGcFmaJgB", "category": "premade", "labels": {} },
                { "name": "Clone", "voice_id": "abc" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(list.voices.len(), 2);
        assert_eq!(list.voices[0].category.as_deref(), Some("premade"));
        assert_eq!(list.voices[1].category, None);
    }
}
