use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::core::config::Settings;
use crate::core::error::PipelineError;
use crate::services::narration::AudioPaths;
use crate::services::script::Script;
use crate::utils::media::{self, EncodeSettings};

/// One scene of the final cut.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    pub index: usize,
    pub image: PathBuf,
    pub audio: Option<PathBuf>,
    pub duration: f64,
}

#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn media_duration(&self, audio: &Path) -> Result<f64>;

    /// Encodes `clips` in order into a single file at `output`.
    async fn render(&self, clips: &[ClipPlan], output: &Path) -> Result<()>;
}

pub struct FfmpegRenderer {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    encode: EncodeSettings,
}

impl FfmpegRenderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ffmpeg_bin: settings.ffmpeg_bin.clone(),
            ffprobe_bin: settings.ffprobe_bin.clone(),
            encode: EncodeSettings::from(settings),
        }
    }

    fn work_dir(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        output.with_file_name(format!(".{}_clips", stem))
    }

    async fn encode_all(&self, clips: &[ClipPlan], work_dir: &Path, output: &Path) -> Result<()> {
        tokio::fs::create_dir_all(work_dir).await?;

        let pb = ProgressBar::new(clips.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} clips ({eta})")?
                .progress_chars("#>-"),
        );

        let mut parts = Vec::with_capacity(clips.len());
        for clip in clips {
            let part = work_dir.join(format!("clip_{:03}.mp4", clip.index + 1));
            let args = media::clip_args(&clip.image, clip.audio.as_deref(), clip.duration, &self.encode, &part);
            media::run_tool(&self.ffmpeg_bin, &args)
                .await
                .with_context(|| format!("Failed to encode clip {}", clip.index + 1))?;
            parts.push(part);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let list_file = work_dir.join("clips.txt");
        tokio::fs::write(&list_file, media::concat_list(&parts)).await?;
        let args = media::concat_args(&list_file, &self.encode, output);
        media::run_tool(&self.ffmpeg_bin, &args)
            .await
            .context("Failed to join clips")?;
        Ok(())
    }
}

#[async_trait]
impl VideoRenderer for FfmpegRenderer {
    async fn media_duration(&self, audio: &Path) -> Result<f64> {
        media::media_duration(&self.ffprobe_bin, audio).await
    }

    async fn render(&self, clips: &[ClipPlan], output: &Path) -> Result<()> {
        let work_dir = Self::work_dir(output);
        let result = self.encode_all(clips, &work_dir, output).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", work_dir.display(), e);
            }
        }
        if result.is_err() {
            let _ = tokio::fs::remove_file(output).await;
        }
        result
    }
}

pub struct AssemblyStage<'a> {
    settings: &'a Settings,
    output_dir: PathBuf,
    renderer: &'a dyn VideoRenderer,
}

impl<'a> AssemblyStage<'a> {
    pub fn new(settings: &'a Settings, output_dir: PathBuf, renderer: &'a dyn VideoRenderer) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        Ok(Self {
            settings,
            output_dir,
            renderer,
        })
    }

    pub fn output_path(&self, script: &Script) -> PathBuf {
        self.output_dir.join(format!("{}.mp4", script.file_stem()))
    }

    /// Scene durations: narration length plus padding when the narration file
    /// exists, otherwise the scene's estimate or the configured default.
    pub async fn plan(&self, script: &Script, images: &[PathBuf], audio: &AudioPaths) -> Result<Vec<ClipPlan>> {
        if script.scenes.is_empty() {
            return Err(PipelineError::Render("script has no scenes".to_string()).into());
        }

        let mut clips = Vec::with_capacity(script.scenes.len());
        for (i, scene) in script.scenes.iter().enumerate() {
            let image = images
                .get(i)
                .filter(|p| p.exists())
                .cloned()
                .ok_or_else(|| PipelineError::Render(format!("missing image for scene {}", i + 1)))?;

            let audio = audio.get(&i).filter(|p| p.exists()).cloned();
            let duration = match &audio {
                Some(path) => {
                    let seconds = self.renderer.media_duration(path).await.map_err(|e| {
                        PipelineError::Render(format!("cannot read duration of {}: {:#}", path.display(), e))
                    })?;
                    seconds + self.settings.audio_padding_seconds
                }
                None => scene.duration_est.unwrap_or(self.settings.default_scene_seconds),
            };

            info!("Scene {}: {:.2}s", i + 1, duration);
            clips.push(ClipPlan {
                index: i,
                image,
                audio,
                duration,
            });
        }
        Ok(clips)
    }

    pub async fn assemble(&self, script: &Script, images: &[PathBuf], audio: &AudioPaths) -> Result<PathBuf> {
        let clips = self.plan(script, images, audio).await?;
        let output = self.output_path(script);

        println!("Rendering {} clips to {}", clips.len(), output.display());
        self.renderer
            .render(&clips, &output)
            .await
            .map_err(|e| PipelineError::Render(format!("{:#}", e)))?;

        info!("Video written to {}", output.display());
        Ok(output)
    }
}
