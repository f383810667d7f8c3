//! Scene stills. One image per scene, written to the pod's assets folder.
//!
//! The provider is picked once per run: the primary service when its key is
//! configured and mock visuals are off, otherwise the mock chain (Imagen when
//! enabled, then a solid-colour placeholder, then a marker file).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::config::{ApiKeys, Settings};
use crate::core::error::PipelineError;
use crate::core::pod::file_component;
use crate::services::script::Script;
use crate::utils::media;

const IMAGEN_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Placeholder body written when no image backend produced a file.
pub const MOCK_IMAGE_CONTENT: &[u8] = b"Mock Image Content";

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Renders the still for scene `index` (zero-based) into `output`.
    async fn render(&self, index: usize, prompt: &str, output: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualMode {
    Primary,
    Mock,
}

pub fn select_visual_mode(settings: &Settings, keys: &ApiKeys) -> VisualMode {
    if settings.mock_visuals || keys.sjinn.is_none() {
        VisualMode::Mock
    } else {
        VisualMode::Primary
    }
}

pub fn create_image_provider(
    settings: &Settings,
    keys: &ApiKeys,
    art_style: &str,
) -> Box<dyn ImageProvider> {
    let placeholder = PlaceholderImages::new(settings);
    let mock: Box<dyn ImageProvider> = if settings.generative_mock_images {
        Box::new(ImagenImages::new(
            keys.google.as_deref(),
            &settings.image_model,
            art_style,
            placeholder,
        ))
    } else {
        Box::new(placeholder)
    };

    match select_visual_mode(settings, keys) {
        VisualMode::Primary => {
            info!("Visual provider: SJinn");
            Box::new(PrimaryImages::new(mock))
        }
        VisualMode::Mock => {
            info!("Visual provider: mock ({})", mock.name());
            mock
        }
    }
}

// --- Placeholder ---

/// Solid-colour still labelled with the scene number and prompt. Never fails
/// for lack of ffmpeg: the marker file stands in for the image.
pub struct PlaceholderImages {
    ffmpeg_bin: String,
    width: u32,
    height: u32,
}

impl PlaceholderImages {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ffmpeg_bin: settings.ffmpeg_bin.clone(),
            width: settings.canvas_width,
            height: settings.canvas_height,
        }
    }

    pub fn caption(index: usize, prompt: &str) -> String {
        format!("SCENE {}\n{}...", index + 1, media::truncate_chars(prompt, 50))
    }

    async fn draw(&self, index: usize, prompt: &str, output: &Path) -> Result<()> {
        let color = media::scene_color(index);
        let text_file = output.with_extension("txt");
        tokio::fs::write(&text_file, Self::caption(index, prompt)).await?;

        let args = media::placeholder_image_args(
            output,
            color,
            self.width,
            self.height,
            Some(text_file.as_path()),
        );
        let labelled = media::run_tool(&self.ffmpeg_bin, &args).await;
        let _ = tokio::fs::remove_file(&text_file).await;

        if let Err(e) = labelled {
            debug!("Labelled placeholder failed, drawing plain colour: {:#}", e);
            let args = media::placeholder_image_args(output, color, self.width, self.height, None);
            media::run_tool(&self.ffmpeg_bin, &args).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ImageProvider for PlaceholderImages {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn render(&self, index: usize, prompt: &str, output: &Path) -> Result<()> {
        if let Err(e) = self.draw(index, prompt, output).await {
            warn!("Could not draw placeholder image ({:#}). Writing mock file.", e);
            tokio::fs::write(output, MOCK_IMAGE_CONTENT).await?;
        }
        Ok(())
    }
}

// --- Imagen ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

/// Generative mock images through Imagen. Every failure falls back to the
/// placeholder with a warning.
pub struct ImagenImages {
    api_key: Option<String>,
    model: String,
    art_style: String,
    client: reqwest::Client,
    fallback: PlaceholderImages,
}

impl ImagenImages {
    pub fn new(api_key: Option<&str>, model: &str, art_style: &str, fallback: PlaceholderImages) -> Self {
        Self {
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            art_style: art_style.to_string(),
            client: reqwest::Client::new(),
            fallback,
        }
    }

    fn styled_prompt(&self, prompt: &str) -> String {
        if self.art_style.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("{}. Art style: {}", prompt, self.art_style)
        }
    }

    fn build_request(&self, prompt: &str) -> PredictRequest {
        PredictRequest {
            instances: vec![PredictInstance {
                prompt: self.styled_prompt(prompt),
            }],
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: "16:9".to_string(),
            },
        }
    }

    async fn generate(&self, api_key: &str, prompt: &str, output: &Path) -> Result<()> {
        let url = format!("{}/models/{}:predict", IMAGEN_API_BASE, self.model);
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(prompt))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Provider {
                provider: "Imagen",
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }
            .into());
        }

        let body = resp.text().await?;
        let bytes = decode_prediction(&body)?;
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }
}

fn decode_prediction(body: &str) -> Result<Vec<u8>> {
    let response: PredictResponse =
        serde_json::from_str(body).context("Unexpected Imagen response")?;
    let encoded = response
        .predictions
        .into_iter()
        .find_map(|p| p.bytes_base64_encoded)
        .ok_or_else(|| anyhow!("Imagen returned no image"))?;
    Ok(STANDARD.decode(encoded)?)
}

#[async_trait]
impl ImageProvider for ImagenImages {
    fn name(&self) -> &'static str {
        "imagen"
    }

    async fn render(&self, index: usize, prompt: &str, output: &Path) -> Result<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("GOOGLE_API_KEY not set. Using placeholder image.");
            return self.fallback.render(index, prompt, output).await;
        };

        match self.generate(api_key, prompt, output).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Imagen failed for scene {} ({:#}). Using placeholder image.", index + 1, e);
                self.fallback.render(index, prompt, output).await
            }
        }
    }
}

// --- Primary ---

/// SJinn image service. The integration is not wired up yet, so every scene
/// goes through the mock chain.
pub struct PrimaryImages {
    fallback: Box<dyn ImageProvider>,
}

impl PrimaryImages {
    pub fn new(fallback: Box<dyn ImageProvider>) -> Self {
        Self { fallback }
    }
}

#[async_trait]
impl ImageProvider for PrimaryImages {
    fn name(&self) -> &'static str {
        "sjinn"
    }

    async fn render(&self, index: usize, prompt: &str, output: &Path) -> Result<()> {
        warn!("SJinn provider integration incomplete. Using mock image for scene {}.", index + 1);
        self.fallback.render(index, prompt, output).await
    }
}

// --- Stage ---

pub struct VisualStage<'a> {
    assets_dir: PathBuf,
    provider: &'a dyn ImageProvider,
}

impl<'a> VisualStage<'a> {
    pub fn new(assets_dir: PathBuf, provider: &'a dyn ImageProvider) -> Result<Self> {
        std::fs::create_dir_all(&assets_dir)
            .with_context(|| format!("Failed to create {}", assets_dir.display()))?;
        Ok(Self { assets_dir, provider })
    }

    pub fn file_name(index: usize, character: &str) -> String {
        format!("scene_{:03}_{}.png", index + 1, file_component(character))
    }

    /// One path per scene, in scene order.
    pub async fn generate(&self, script: &Script) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(script.scenes.len());
        for (i, scene) in script.scenes.iter().enumerate() {
            let output = self.assets_dir.join(Self::file_name(i, &scene.character));
            info!("Rendering scene {} with {}", i + 1, self.provider.name());
            self.provider
                .render(i, &scene.visual_prompt, &output)
                .await
                .with_context(|| format!("Image generation failed for scene {}", i + 1))?;
            paths.push(output);
        }
        Ok(paths)
    }
}
