//! Step recording for observability (`profile`, `shortlist`, `attempt_N`, ...).

use async_trait::async_trait;
use mdenrich_shared::Result;
use mdenrich_storage::{Journal, RunStatus};

#[async_trait]
pub trait StepRecorder: Send + Sync {
    async fn record(&self, step: &str, payload: serde_json::Value) -> Result<()>;
}

/// Discards every step. Used when the journal is disabled.
pub struct NoopRecorder;

#[async_trait]
impl StepRecorder for NoopRecorder {
    async fn record(&self, _step: &str, _payload: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Records steps of a single run into the libSQL [`Journal`].
pub struct JournalRecorder {
    journal: Journal,
    run_id: String,
}

impl JournalRecorder {
    /// Start a run for `article_path` and return a recorder bound to it.
    pub async fn start(journal: Journal, article_path: &str, article_text: &str) -> Result<Self> {
        let run_id = journal.start_run(article_path, article_text).await?;
        tracing::info!(%run_id, "journal run started");
        Ok(Self { journal, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn finish(&self, status: RunStatus, output_path: Option<&str>) -> Result<()> {
        self.journal
            .finish_run(&self.run_id, status, output_path)
            .await
    }
}

#[async_trait]
impl StepRecorder for JournalRecorder {
    async fn record(&self, step: &str, payload: serde_json::Value) -> Result<()> {
        self.journal.record_step(&self.run_id, step, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn journal_recorder_writes_steps_for_its_run() {
        let path = std::env::temp_dir().join(format!("mdenrich_recorder_{}.db", Uuid::now_v7()));
        let journal = Journal::open(&path).await.unwrap();
        let recorder = JournalRecorder::start(journal, "a.md", "# A\n").await.unwrap();

        recorder.record("profile", json!({"headings": ["A"]})).await.unwrap();
        recorder
            .finish(RunStatus::Accepted, Some("out/enriched_a.md"))
            .await
            .unwrap();

        let reopened = Journal::open(&path).await.unwrap();
        let run = reopened.get_run(recorder.run_id()).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Accepted);
        let steps = reopened.list_steps(recorder.run_id()).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].payload["headings"][0], "A");
    }
}
