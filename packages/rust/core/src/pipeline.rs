//! End-to-end `enrich` pipeline: article → profile → shortlist → probe →
//! attempts → output file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::json;
use tracing::{info, instrument, warn};

use mdenrich_markdown::build_profile;
use mdenrich_probe::{ProbeConfig, Prober};
use mdenrich_shared::{
    AppConfig, CandidateBucket, EnrichError, Profile, QaMode, Result, config_dir, resolve_api_key,
};
use mdenrich_storage::{Catalog, Journal, RunStatus};

use crate::fallback::FallbackSelector;
use crate::openrouter::{OpenRouterClient, OpenRouterReviewer, OpenRouterSelector};
use crate::orchestrator::{ArticleInput, Orchestrator, OrchestratorConfig};
use crate::recorder::{JournalRecorder, NoopRecorder, StepRecorder};
use crate::review::Reviewer;
use crate::selector::Selector;
use crate::source::CandidateSource;

const JOURNAL_FILE_NAME: &str = "journal.db";

/// What to enrich and how. `None` fields fall back to the loaded config.
#[derive(Debug, Clone, Default)]
pub struct EnrichRequest {
    pub article_path: PathBuf,
    pub keywords_path: PathBuf,
    pub out_path: Option<PathBuf>,
    pub model: Option<String>,
    /// Force the deterministic selector and skip the reviewer.
    pub offline: bool,
    pub qa_mode: Option<QaMode>,
    pub max_attempts: Option<u32>,
    /// Skip availability probing even when enabled in config.
    pub no_probe: bool,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct EnrichResult {
    pub output_path: PathBuf,
    /// Journal run id when the journal is enabled.
    pub run_id: Option<String>,
    pub attempts: u32,
    pub cost: f64,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &EnrichResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &EnrichResult) {}
}

/// Injected collaborators for [`enrich_with`].
pub struct Collaborators<'a> {
    pub source: &'a dyn CandidateSource,
    pub selector: &'a dyn Selector,
    pub reviewer: Option<&'a dyn Reviewer>,
    pub recorder: &'a dyn StepRecorder,
    pub prober: Option<&'a Prober>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))
}

/// One keyword per non-blank line, trimmed.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

pub fn load_keywords(path: &Path) -> Result<Vec<String>> {
    let keywords = parse_keywords(&read_text(path)?);
    if keywords.is_empty() {
        return Err(EnrichError::validation(format!(
            "no keywords in {}",
            path.display()
        )));
    }
    Ok(keywords)
}

/// Brand rules text, empty when none are configured.
pub fn load_brand_rules(config: &AppConfig) -> Result<String> {
    match &config.catalog.brand_rules {
        Some(path) => read_text(Path::new(path)),
        None => Ok(String::new()),
    }
}

/// `{output_dir}/enriched_{article file name}`.
pub fn default_output_path(config: &AppConfig, article_path: &Path) -> PathBuf {
    let name = article_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "article.md".to_string());
    PathBuf::from(&config.defaults.output_dir).join(format!("enriched_{name}"))
}

/// Configured journal location, or `~/.mdenrich/journal.db`.
pub fn journal_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.journal.path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(JOURNAL_FILE_NAME)),
    }
}

fn write_output(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
        }
    }
    std::fs::write(path, markdown).map_err(|e| EnrichError::io(path, e))
}

/// Profile the article and build the (optionally probed) shortlist.
pub async fn build_candidates(
    article_text: &str,
    profile: &Profile,
    keywords: &[String],
    source: &dyn CandidateSource,
    prober: Option<&Prober>,
) -> Result<CandidateBucket> {
    let media = source.media().await?;
    let links = source.links().await?;
    info!(media = media.len(), links = links.len(), "catalog loaded");

    let bucket = mdenrich_shortlist::shortlist(article_text, profile, keywords, &media, &links);
    Ok(match prober {
        Some(prober) => prober.filter_bucket(bucket).await,
        None => bucket,
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the pipeline with explicit collaborators. Nothing is written unless an
/// attempt is accepted.
#[instrument(skip_all, fields(article = %request.article_path.display()))]
pub async fn enrich_with(
    config: &AppConfig,
    request: &EnrichRequest,
    collaborators: Collaborators<'_>,
    progress: &dyn ProgressReporter,
) -> Result<EnrichResult> {
    let start = Instant::now();

    progress.phase("Loading article");
    let article_text = read_text(&request.article_path)?;
    let keywords = load_keywords(&request.keywords_path)?;
    let brand_rules = load_brand_rules(config)?;

    let profile = build_profile(&article_text);
    record(
        collaborators.recorder,
        "profile",
        json!({"headings": profile.headings}),
    )
    .await;

    progress.phase("Shortlisting candidates");
    let bucket = build_candidates(
        &article_text,
        &profile,
        &keywords,
        collaborators.source,
        None,
    )
    .await?;
    record(
        collaborators.recorder,
        "shortlist",
        json!({
            "hero": bucket.hero.len(),
            "context": bucket.context.len(),
            "links": bucket.links.len(),
        }),
    )
    .await;

    let bucket = match collaborators.prober {
        Some(prober) => {
            progress.phase("Checking candidate availability");
            prober.filter_bucket(bucket).await
        }
        None => bucket,
    };

    progress.phase("Selecting and reviewing");
    let mut orchestrator_config = OrchestratorConfig::from(config);
    orchestrator_config.offline = request.offline;
    if let Some(model) = &request.model {
        orchestrator_config.model = model.clone();
    }
    if let Some(mode) = request.qa_mode {
        orchestrator_config.qa_mode = mode;
    }
    if let Some(max) = request.max_attempts {
        orchestrator_config.max_attempts = max;
    }

    let mut orchestrator =
        Orchestrator::new(orchestrator_config, collaborators.selector, collaborators.recorder);
    if let Some(reviewer) = collaborators.reviewer {
        orchestrator = orchestrator.with_reviewer(reviewer);
    }
    let outcome = orchestrator
        .run(&ArticleInput {
            article_text: &article_text,
            profile: &profile,
            keywords: &keywords,
            bucket: &bucket,
            brand_rules: &brand_rules,
        })
        .await?;

    progress.phase("Writing output");
    let output_path = request
        .out_path
        .clone()
        .unwrap_or_else(|| default_output_path(config, &request.article_path));
    write_output(&output_path, &outcome.markdown)?;
    info!(path = %output_path.display(), attempts = outcome.attempts, cost = outcome.cost, "output written");

    let result = EnrichResult {
        output_path,
        run_id: None,
        attempts: outcome.attempts,
        cost: outcome.cost,
        elapsed: start.elapsed(),
    };
    progress.done(&result);
    Ok(result)
}

/// Run the pipeline against the configured catalog, OpenRouter and journal.
pub async fn enrich(
    config: &AppConfig,
    request: &EnrichRequest,
    progress: &dyn ProgressReporter,
) -> Result<EnrichResult> {
    progress.phase("Opening catalog");
    let catalog = Catalog::open(
        Path::new(&config.catalog.media_db),
        Path::new(&config.catalog.links_db),
    )
    .await?;

    let api_key = if request.offline {
        None
    } else {
        match resolve_api_key(config) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "no API key; running offline");
                None
            }
        }
    };
    let qa_mode = request.qa_mode.unwrap_or(config.defaults.qa_mode);
    if qa_mode == QaMode::Ai && api_key.is_none() {
        return Err(EnrichError::config(
            "qa mode 'ai' needs an OpenRouter API key and online mode",
        ));
    }

    let fallback = FallbackSelector::new(config.selection.section_hints.clone());
    let model = request
        .model
        .clone()
        .unwrap_or_else(|| config.openrouter.default_model.clone());
    let (upstream, reviewer) = match &api_key {
        Some(key) => {
            let client = OpenRouterClient::new(&config.openrouter, key.clone())?;
            (
                Some(OpenRouterSelector::new(
                    client.clone(),
                    &config.openrouter,
                    fallback.clone(),
                )),
                Some(OpenRouterReviewer::new(
                    client,
                    model.clone(),
                    config.defaults.qa_threshold,
                )),
            )
        }
        None => (None, None),
    };
    let selector: &dyn Selector = match &upstream {
        Some(s) => s,
        None => &fallback,
    };

    let probe_enabled = config.availability.enabled && !request.no_probe;
    let prober = if probe_enabled {
        Some(Prober::new(&ProbeConfig::from(config))?)
    } else {
        None
    };

    let journal = if config.journal.enabled {
        let path = journal_path(config)?;
        let article_text = read_text(&request.article_path)?;
        let journal = Journal::open(&path).await?;
        Some(
            JournalRecorder::start(
                journal,
                &request.article_path.to_string_lossy(),
                &article_text,
            )
            .await?,
        )
    } else {
        None
    };
    let recorder: &dyn StepRecorder = match &journal {
        Some(j) => j,
        None => &NoopRecorder,
    };

    let effective = EnrichRequest {
        offline: api_key.is_none(),
        model: Some(model),
        ..request.clone()
    };
    let result = enrich_with(
        config,
        &effective,
        Collaborators {
            source: &catalog,
            selector,
            reviewer: reviewer.as_ref().map(|r| r as &dyn Reviewer),
            recorder,
            prober: prober.as_ref(),
        },
        progress,
    )
    .await;

    match (&journal, result) {
        (Some(j), Ok(mut res)) => {
            let output = res.output_path.to_string_lossy().into_owned();
            if let Err(e) = j.finish(RunStatus::Accepted, Some(&output)).await {
                warn!(error = %e, "failed to close journal run");
            }
            res.run_id = Some(j.run_id().to_string());
            Ok(res)
        }
        (Some(j), Err(err)) => {
            if let Err(e) = j.finish(RunStatus::Failed, None).await {
                warn!(error = %e, "failed to close journal run");
            }
            Err(err)
        }
        (None, result) => result,
    }
}

/// Profile + shortlist only, for inspection.
pub async fn shortlist_article(
    config: &AppConfig,
    article_path: &Path,
    keywords_path: &Path,
    probe: bool,
) -> Result<CandidateBucket> {
    let article_text = read_text(article_path)?;
    let keywords = load_keywords(keywords_path)?;
    let catalog = Catalog::open(
        Path::new(&config.catalog.media_db),
        Path::new(&config.catalog.links_db),
    )
    .await?;
    let prober = if probe {
        Some(Prober::new(&ProbeConfig::from(config))?)
    } else {
        None
    };
    let profile = build_profile(&article_text);
    build_candidates(&article_text, &profile, &keywords, &catalog, prober.as_ref()).await
}

async fn record(recorder: &dyn StepRecorder, step: &str, payload: serde_json::Value) {
    if let Err(e) = recorder.record(step, payload).await {
        warn!(step, error = %e, "failed to record step");
    }
}
