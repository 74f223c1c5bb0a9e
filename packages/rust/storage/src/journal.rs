//! Run journal: one row per enrichment run plus JSON step payloads.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use mdenrich_shared::{EnrichError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::migrations;

/// Terminal (or current) state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Accepted,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Accepted => "accepted",
            Self::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "running" => Ok(Self::Running),
            "accepted" => Ok(Self::Accepted),
            "failed" => Ok(Self::Failed),
            other => Err(EnrichError::Storage(format!("unknown run status: {other}"))),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub article_path: String,
    /// Hex SHA-256 of the article text.
    pub article_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// libSQL-backed run journal. Opening applies pending migrations.
pub struct Journal {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Journal {
    /// Open or create the journal at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| EnrichError::Storage(e.to_string()))?;

        let journal = Self { db, conn };
        journal.run_migrations().await?;
        Ok(journal)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying journal migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    EnrichError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a `running` row and return its id (UUID v7).
    pub async fn start_run(&self, article_path: &str, article_text: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let hash = article_hash(article_text);
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, article_path, article_hash, started_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    article_path,
                    hash.as_str(),
                    now.as_str(),
                    RunStatus::Running.as_str()
                ],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        Ok(id)
    }

    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        output_path: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, status = ?2, output_path = ?3 WHERE id = ?4",
                params![now.as_str(), status.as_str(), output_path, run_id],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, article_path, article_hash, started_at, finished_at, status, output_path
                 FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(EnrichError::Storage(e.to_string())),
        }
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, article_path, article_hash, started_at, finished_at, status, output_path
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    pub async fn record_step(
        &self,
        run_id: &str,
        step: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let json = serde_json::to_string(payload)
            .map_err(|e| EnrichError::Storage(format!("step payload: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO run_steps (run_id, step, payload_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, step, json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        tracing::debug!(run_id, step, size = json.len(), "recorded run step");
        Ok(())
    }

    /// Steps of a run in recording order.
    pub async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT step, payload_json, recorded_at FROM run_steps
                 WHERE run_id = ?1 ORDER BY id",
                params![run_id],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let raw: String = row
                .get(1)
                .map_err(|e| EnrichError::Storage(e.to_string()))?;
            results.push(StepRecord {
                step: row
                    .get::<String>(0)
                    .map_err(|e| EnrichError::Storage(e.to_string()))?,
                payload: serde_json::from_str(&raw)
                    .map_err(|e| EnrichError::Storage(format!("step payload: {e}")))?,
                recorded_at: parse_timestamp(
                    &row.get::<String>(2)
                        .map_err(|e| EnrichError::Storage(e.to_string()))?,
                )?,
            });
        }
        Ok(results)
    }
}

/// Hex SHA-256 of the article text.
pub fn article_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EnrichError::Storage(format!("invalid date: {e}")))
}

fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    Ok(RunRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| EnrichError::Storage(e.to_string()))?,
        article_path: row
            .get::<String>(1)
            .map_err(|e| EnrichError::Storage(e.to_string()))?,
        article_hash: row
            .get::<String>(2)
            .map_err(|e| EnrichError::Storage(e.to_string()))?,
        started_at: parse_timestamp(
            &row.get::<String>(3)
                .map_err(|e| EnrichError::Storage(e.to_string()))?,
        )?,
        finished_at: match row.get::<String>(4).ok() {
            Some(raw) => Some(parse_timestamp(&raw)?),
            None => None,
        },
        status: RunStatus::parse(
            &row.get::<String>(5)
                .map_err(|e| EnrichError::Storage(e.to_string()))?,
        )?,
        output_path: row.get::<String>(6).ok(),
    })
}
