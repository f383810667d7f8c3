use anyhow::Result;
use clap::{Parser, Subcommand};

use pod_video_creator::core::config::{ApiKeys, Settings, SETTINGS_FILE};
use pod_video_creator::core::error::PipelineError;
use pod_video_creator::core::pod::PodPaths;
use pod_video_creator::services::setup;
use pod_video_creator::services::workflow::{RunOutcome, WorkflowManager};

#[derive(Parser)]
#[command(name = "pod-video-creator", version, about = "Turns a topic into a narrated video episode")]
struct Cli {
    /// Episode topic. Defaults to the configured topic.
    #[arg(long)]
    topic: Option<String>,

    /// Pod folder name under the pods directory.
    #[arg(long)]
    pod: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List ElevenLabs voices available to the account
    Voices,
    /// List Gemini models that can generate text or images
    Models,
    /// Bind voices to the pod's characters interactively
    Setup,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {:#}", e);
            eprintln!("Please check '{}' or remove it to use defaults.", SETTINGS_FILE);
            return Err(e);
        }
    };
    let keys = ApiKeys::from_env();
    let pod_name = cli.pod.unwrap_or_else(|| settings.default_pod.clone());
    let paths = PodPaths::new(&settings.pods_dir, &pod_name);

    match cli.command {
        Some(Command::Voices) => setup::print_voices(&keys).await,
        Some(Command::Models) => setup::print_models(&keys).await,
        Some(Command::Setup) => setup::run_setup(&paths, &keys).await,
        None => {
            let topic = cli.topic.unwrap_or_else(|| settings.default_topic.clone());
            run_episode(settings, paths, &keys, &topic).await
        }
    }
}

async fn run_episode(settings: Settings, paths: PodPaths, keys: &ApiKeys, topic: &str) -> Result<()> {
    println!("Starting pipeline for pod: {}", paths.name);

    let mut manager = match WorkflowManager::open(settings, paths.clone(), keys).await {
        Ok(m) => m,
        Err(e) => {
            if let Some(PipelineError::Config(msg)) = PipelineError::find(&e) {
                eprintln!("Error: {}", msg);
            }
            return Err(e);
        }
    };

    match manager.run(topic).await? {
        RunOutcome::Completed { title, video_path } => {
            println!("\nEpisode '{}' finished.", title);
            println!("Video saved to {}", video_path.display());
        }
        RunOutcome::Aborted { stage, reason } => {
            log::warn!("Run aborted at {}: {}", stage, reason);
        }
    }
    Ok(())
}
