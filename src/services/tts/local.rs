use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{write_mock_audio, TtsClient};

/// Offline narration through a system speech command (`say` on macOS).
/// Any failure leaves a marker file in place of the audio.
pub struct LocalSpeechClient {
    command: String,
}

impl LocalSpeechClient {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// `--` ends option parsing so narration starting with `-` stays text.
    fn speech_args(text: &str, output: &Path) -> Vec<OsString> {
        vec![
            "-o".into(),
            output.as_os_str().to_os_string(),
            "--data-format=LEF32@22050".into(),
            "--".into(),
            text.into(),
        ]
    }

    async fn speak(&self, text: &str, output: &Path) -> Result<bool> {
        if self.command.trim().is_empty() {
            return Ok(false);
        }
        let status = Command::new(&self.command)
            .args(Self::speech_args(text, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success() && tokio::fs::try_exists(output).await?)
    }
}

#[async_trait]
impl TtsClient for LocalSpeechClient {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn synthesize(&self, text: &str, _voice_id: &str, output: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::remove_file(output).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not clear {}: {}", output.display(), e);
            }
        }

        match self.speak(text, output).await {
            Ok(true) => {
                debug!("Local speech written to {}", output.display());
                Ok(())
            }
            Ok(false) => {
                warn!("Local speech produced no file. Writing mock audio.");
                write_mock_audio(output).await
            }
            Err(e) => {
                warn!("Local speech command '{}' unavailable: {}", self.command, e);
                write_mock_audio(output).await
            }
        }
    }
}
