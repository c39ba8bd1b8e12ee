use thiserror::Error;

/// Stage failures of the generation pipeline. Per-topic variants are caught by
/// the orchestrator and reported as data; `LoadTopics` and `AlreadyRunning`
/// abort the whole batch before any topic is attempted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load topics: {0:#}")]
    LoadTopics(anyhow::Error),
    #[error("a batch run is already in progress")]
    AlreadyRunning,
    #[error("failed to generate any images for '{keyword}'")]
    NoImages { keyword: String },
    #[error("document generation failed: {0:#}")]
    TextGeneration(anyhow::Error),
    #[error("text provider returned an empty document")]
    EmptyDocument,
    #[error("failed to persist document {slug}: {cause:#}")]
    Persist { slug: String, cause: anyhow::Error },
    #[error("failed to update topic store: {0:#}")]
    TopicUpdate(anyhow::Error),
    #[error("topic {0} not found in topic store")]
    TopicNotFound(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn messages_include_context_chain() {
        let cause = Err::<(), _>(anyhow!("disk full"))
            .context("failed to write post")
            .unwrap_err();
        let err = PipelineError::Persist {
            slug: "1-a".into(),
            cause,
        };
        assert_eq!(
            err.to_string(),
            "failed to persist document 1-a: failed to write post: disk full"
        );
        assert_eq!(
            PipelineError::NoImages { keyword: "임플란트".into() }.to_string(),
            "failed to generate any images for '임플란트'"
        );
    }
}
