use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use url::Url;

use crate::core::config::{ApiKeys, Settings};
use crate::core::error::PipelineError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Builds the script-stage LLM. The Google key is mandatory here, unlike the
/// optional image and narration keys.
pub fn create_llm(settings: &Settings, keys: &ApiKeys) -> Result<Box<dyn LlmClient>> {
    let api_key = keys
        .google
        .as_deref()
        .ok_or_else(|| PipelineError::Config("GOOGLE_API_KEY not found in environment".to_string()))?;
    Ok(Box::new(
        GeminiClient::new(api_key, &settings.script_model).with_json_output(),
    ))
}

// --- Gemini ---

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    json_output: bool,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            json_output: false,
            client: reqwest::Client::new(),
        }
    }

    /// Asks the model for an `application/json` body instead of free text.
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    fn endpoint(&self) -> Result<Url> {
        let url = Url::parse_with_params(
            &format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model),
            &[("key", self.api_key.as_str())],
        )?;
        Ok(url)
    }

    fn build_request(&self, system: &str, user: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: user.to_string() }],
            }],
            system_instruction: (!system.is_empty()).then(|| GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system.to_string() }],
            }),
            generation_config: self.json_output.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

fn extract_text(response_text: &str) -> Result<String> {
    let result: GeminiResponse = serde_json::from_str(response_text).map_err(|e| {
        anyhow!("Failed to parse Gemini response: {}. Body: {}", e, response_text)
    })?;

    if let Some(err) = result.error {
        return Err(anyhow!("Gemini API returned error: {}", err.message));
    }

    if let Some(first) = result.candidates.as_ref().and_then(|c| c.first()) {
        if let Some(part) = first.content.as_ref().and_then(|c| c.parts.first()) {
            return Ok(part.text.clone());
        }
        let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
        return Err(anyhow!("Gemini response empty. Finish reason: {}", reason));
    }

    Err(anyhow!("Gemini response format unexpected or empty. Body: {}", response_text))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint()?)
            .json(&self.build_request(system, user))
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {}", error_text));
        }

        let response_text = resp.text().await?;
        extract_text(&response_text)
    }
}

// --- Model catalogue ---

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn generates_content_or_images(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent" || m == "generateImage" || m == "predict")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

pub async fn list_models(api_key: &str) -> Result<Vec<ModelInfo>> {
    let client = reqwest::Client::new();
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut params = vec![("key", api_key.to_string())];
        if let Some(token) = &page_token {
            params.push(("pageToken", token.clone()));
        }
        let url = Url::parse_with_params(&format!("{}/models", GEMINI_API_BASE), &params)?;

        let resp = client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Provider {
                provider: "Gemini",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }
            .into());
        }

        let page: ModelList = resp.json().await?;
        models.extend(page.models);
        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_safety_block() {
        let json = r#"{
            "candidates": [
                { "finishReason": "SAFETY", "index": 0 }
            ]
        }"#;

        let err = extract_text(json).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_text_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [ { "text": "{\"title\": \"Hola\"}" } ],
                        "role": "model"
                    },
                    "finishReason": "STOP",
                    "index": 0
                }
            ]
        }"#;

        assert_eq!(extract_text(json).unwrap(), r#"{"title": "Hola"}"#);
    }

    #[test]
    fn test_extract_text_api_error() {
        let json = r#"{ "error": { "code": 400, "message": "API key not valid" } }"#;
        let err = extract_text(json).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_json_mode_request_shape() {
        let client = GeminiClient::new("k", "gemini-test").with_json_output();
        let body = serde_json::to_value(client.build_request("", "hola")).unwrap();

        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hola");
    }

    #[test]
    fn test_endpoint_carries_key() {
        let client = GeminiClient::new("abc", "gemini-test");
        let url = client.endpoint().unwrap();
        assert_eq!(url.path(), "/v1beta/models/gemini-test:generateContent");
        assert_eq!(url.query(), Some("key=abc"));
    }

    #[test]
    fn test_missing_google_key_is_config_error() {
        let err = create_llm(&Settings::default(), &ApiKeys::default()).unwrap_err();
        assert_eq!(PipelineError::find(&err).map(|e| e.kind()), Some("config"));
    }

    #[test]
    fn test_model_filter() {
        let list: ModelList = serde_json::from_str(
            r#"{ "models": [
                { "name": "models/gemini-pro", "supportedGenerationMethods": ["generateContent", "countTokens"] },
                { "name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"] },
                { "name": "models/imagen-3.0-generate-002", "supportedGenerationMethods": ["predict"] }
            ] }"#,
        )
        .unwrap();

        let names: Vec<&str> = list
            .models
            .iter()
            .filter(|m| m.generates_content_or_images())
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["models/gemini-pro", "models/imagen-3.0-generate-002"]);
    }
}
