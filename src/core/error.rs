use thiserror::Error;

/// Failures that end a pipeline run.
///
/// Stages work in `anyhow::Result` and raise these as the root cause, so the
/// orchestrator can classify a failure with [`PipelineError::find`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to decode script: {0}")]
    Decode(String),

    #[error("{provider} API error {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Memory storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Decode(_) => "decode",
            PipelineError::Provider { .. } => "provider",
            PipelineError::Render(_) => "render",
            PipelineError::Storage(_) => "storage",
        }
    }

    /// Finds the typed failure anywhere in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&PipelineError> {
        err.chain().find_map(|cause| cause.downcast_ref::<PipelineError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_find_through_context() {
        let err: anyhow::Error = Err::<(), _>(PipelineError::Render("boom".into()))
            .context("Assembling episode")
            .unwrap_err();

        let found = PipelineError::find(&err).unwrap();
        assert_eq!(found.kind(), "render");
    }

    #[test]
    fn test_provider_display() {
        let err = PipelineError::Provider {
            provider: "ElevenLabs",
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "ElevenLabs API error 401: unauthorized");
        assert_eq!(err.kind(), "provider");
    }
}
