use anyhow::{Context, Result};
use log::{debug, error, info};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{ApiKeys, Settings};
use crate::core::error::PipelineError;
use crate::core::io::{NativeStorage, Storage};
use crate::core::memory::MemoryStore;
use crate::core::pod::{PodConfig, PodPaths};
use crate::core::state::EpisodeSummary;
use crate::services::llm::{create_llm, LlmClient};
use crate::services::narration::NarrationStage;
use crate::services::script::ScriptStage;
use crate::services::tts::{create_tts_client, TtsClient};
use crate::services::video::{AssemblyStage, FfmpegRenderer, VideoRenderer};
use crate::services::visual::{create_image_provider, ImageProvider, VisualStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Script,
    Visuals,
    Audio,
    Assembly,
    CommitMemory,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Script => "script",
            Stage::Visuals => "visuals",
            Stage::Audio => "audio",
            Stage::Assembly => "assembly",
            Stage::CommitMemory => "commit-memory",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { title: String, video_path: PathBuf },
    Aborted { stage: Stage, reason: String },
}

/// External collaborators of a run.
pub struct Providers {
    pub llm: Box<dyn LlmClient>,
    pub images: Box<dyn ImageProvider>,
    pub tts: Box<dyn TtsClient>,
    pub renderer: Box<dyn VideoRenderer>,
}

impl Providers {
    pub fn from_env(settings: &Settings, keys: &ApiKeys, pod: &PodConfig) -> Result<Self> {
        Ok(Self {
            llm: create_llm(settings, keys)?,
            images: create_image_provider(settings, keys, &pod.consistency.art_style_lora),
            tts: create_tts_client(settings, keys),
            renderer: Box::new(FfmpegRenderer::new(settings)),
        })
    }
}

pub struct WorkflowManager {
    settings: Settings,
    paths: PodPaths,
    pod: PodConfig,
    memory: MemoryStore,
    providers: Providers,
    stage: Stage,
}

impl WorkflowManager {
    /// Loads the pod configuration and opens its memory. A missing or
    /// malformed pod configuration is a `Config` error.
    pub async fn new(
        settings: Settings,
        paths: PodPaths,
        providers: Providers,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let pod = PodConfig::load(&paths.config_file())?;
        Self::with_pod(settings, paths, pod, providers, storage).await
    }

    pub async fn with_pod(
        settings: Settings,
        paths: PodPaths,
        pod: PodConfig,
        providers: Providers,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let memory = MemoryStore::open(paths.memory_file(), storage, settings.summary_window).await?;
        Ok(Self {
            settings,
            paths,
            pod,
            memory,
            providers,
            stage: Stage::Init,
        })
    }

    /// Production wiring: real providers chosen from the environment keys.
    pub async fn open(settings: Settings, paths: PodPaths, keys: &ApiKeys) -> Result<Self> {
        let pod = PodConfig::load(&paths.config_file())?;
        let providers = Providers::from_env(&settings, keys, &pod)?;
        Self::with_pod(settings, paths, pod, providers, Arc::new(NativeStorage::new())).await
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    fn enter(&mut self, stage: Stage) {
        debug!("Stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Runs one episode end to end. Stages run strictly in order and the
    /// memory is only touched once the video exists.
    pub async fn run(&mut self, topic: &str) -> Result<RunOutcome> {
        let result = self.run_stages(topic).await;
        if let Err(e) = &result {
            let kind = PipelineError::find(e).map(|p| p.kind()).unwrap_or("unexpected");
            error!("Pipeline failed during {} ({}): {:#}", self.stage, kind, e);
        }
        result
    }

    async fn run_stages(&mut self, topic: &str) -> Result<RunOutcome> {
        info!("Starting episode for pod '{}'", self.paths.name);

        self.enter(Stage::Script);
        println!("\n--- STEP 1: SCRIPT ---");
        println!("Topic: {}", topic);
        let context = self.memory.context_summary().await?;
        let generated = ScriptStage::new(&self.pod, self.providers.llm.as_ref())
            .generate(topic, &context)
            .await;
        let script = match generated {
            Ok(script) => script,
            Err(e) if matches!(PipelineError::find(&e), Some(PipelineError::Decode(_))) => {
                println!("Error generating script. Aborting.");
                self.enter(Stage::Done);
                return Ok(RunOutcome::Aborted {
                    stage: Stage::Script,
                    reason: format!("{:#}", e),
                });
            }
            Err(e) => return Err(e),
        };
        println!("Title: {}", script.title);

        self.enter(Stage::Visuals);
        println!("\n--- STEP 2: VISUALS ---");
        let images = VisualStage::new(self.paths.assets_dir(), self.providers.images.as_ref())?
            .generate(&script)
            .await
            .context("Visual stage failed")?;

        self.enter(Stage::Audio);
        println!("\n--- STEP 3: AUDIO ---");
        let audio = NarrationStage::new(
            &self.pod,
            &self.settings.default_voice_id,
            self.paths.assets_dir(),
            self.providers.tts.as_ref(),
        )?
        .generate(&script)
        .await
        .context("Audio stage failed")?;

        self.enter(Stage::Assembly);
        println!("\n--- STEP 4: ASSEMBLY ---");
        let video_path = AssemblyStage::new(
            &self.settings,
            self.paths.output_dir(),
            self.providers.renderer.as_ref(),
        )?
        .assemble(&script, &images, &audio)
        .await
        .context("Assembly stage failed")?;

        self.enter(Stage::CommitMemory);
        self.memory
            .add_episode(EpisodeSummary {
                title: script.title.clone(),
                summary: script.summary.clone(),
            })
            .await?;

        self.enter(Stage::Done);
        Ok(RunOutcome::Completed {
            title: script.title,
            video_path,
        })
    }
}
