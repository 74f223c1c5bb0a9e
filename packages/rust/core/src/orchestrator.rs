//! Retry orchestrator.
//!
//! Each attempt runs SELECT → RENDER → PRE-VALIDATE/REVIEW and either accepts
//! or feeds its reasons and URLs into the next attempt. Attempts are strictly
//! sequential; the only state carried between them is [`AttemptFeedback`].

use std::collections::{BTreeSet, HashSet};

use serde_json::json;
use tracing::{error, info, instrument, warn};

use mdenrich_markdown::render_enriched;
use mdenrich_shared::{
    AppConfig, CandidateBucket, EnrichError, Profile, QaMode, QaResult, Result, Selection,
};

use crate::recorder::StepRecorder;
use crate::review::Reviewer;
use crate::selector::{SelectionRequest, Selector};
use crate::validate::{prevalidation_score, validate_output};

const PREVALIDATION_REASON: &str = "pre-validation quality below threshold";

/// Runtime knobs of the retry loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub qa_mode: QaMode,
    /// Structural validation requires a keyword in every anchor.
    pub require_keyword_in_anchor: bool,
    /// Minimum summed anchor score (out of 8) for an attempt to be acceptable.
    pub prevalidation_min_score: u32,
    pub model: String,
    pub offline: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.defaults.max_attempts,
            qa_mode: config.defaults.qa_mode,
            require_keyword_in_anchor: config.defaults.require_keyword_in_anchor,
            prevalidation_min_score: config.defaults.prevalidation_min_score,
            model: config.openrouter.default_model.clone(),
            offline: false,
        }
    }
}

/// The per-run inputs shared by every attempt.
#[derive(Debug, Clone, Copy)]
pub struct ArticleInput<'a> {
    pub article_text: &'a str,
    pub profile: &'a Profile,
    pub keywords: &'a [String],
    pub bucket: &'a CandidateBucket,
    pub brand_rules: &'a str,
}

/// Feedback accumulated from rejected attempts.
#[derive(Debug, Clone, Default)]
pub struct AttemptFeedback {
    reject_reasons: Vec<String>,
    avoid_urls: BTreeSet<String>,
    history: Vec<Selection>,
}

impl AttemptFeedback {
    /// The most recently rejected selection.
    pub fn previous(&self) -> Option<&Selection> {
        self.history.last()
    }

    pub fn reject_reasons(&self) -> &[String] {
        &self.reject_reasons
    }

    pub fn avoid_urls(&self) -> &BTreeSet<String> {
        &self.avoid_urls
    }

    pub fn history(&self) -> &[Selection] {
        &self.history
    }

    /// Record a rejected selection: its reasons, every URL it used, and the
    /// selection itself.
    pub fn reject(&mut self, selection: Selection, reasons: Vec<String>) {
        self.reject_reasons.extend(reasons);
        self.avoid_urls
            .extend(selection.urls().into_iter().map(String::from));
        self.history.push(selection);
    }

    /// Record an attempt that produced no selection at all.
    pub fn reject_reason(&mut self, reason: String) {
        self.reject_reasons.push(reason);
    }

    /// Percentage of URLs across rejected selections that repeat an earlier one.
    pub fn repeat_ratio(&self) -> f64 {
        let all: Vec<&str> = self.history.iter().flat_map(Selection::urls).collect();
        if all.is_empty() {
            return 0.0;
        }
        let distinct: HashSet<&str> = all.iter().copied().collect();
        (all.len() - distinct.len()) as f64 / all.len() as f64 * 100.0
    }
}

/// An accepted run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub markdown: String,
    pub selection: Selection,
    /// 1-based attempt that was accepted.
    pub attempts: u32,
    /// Summed selector cost estimate (USD).
    pub cost: f64,
    pub feedback: AttemptFeedback,
}

/// Quality verdict for one rendered attempt, before pre-validation is applied.
enum Quality {
    Passed { rating: Option<u8>, reasons: Vec<String> },
    Failed(Vec<String>),
}

impl From<QaResult> for Quality {
    fn from(qa: QaResult) -> Self {
        info!(
            accepted = ?qa.accepted,
            rating = ?qa.rating,
            threshold = qa.threshold,
            reasons = %qa.reasons.join("; "),
            "quality review result"
        );
        if qa.passed() {
            Self::Passed {
                rating: qa.rating,
                reasons: qa.reasons,
            }
        } else if qa.reasons.is_empty() {
            Self::Failed(vec![format!(
                "quality review rejected the attempt (rating {})",
                qa.rating.map_or_else(|| "none".to_string(), |r| r.to_string())
            )])
        } else {
            Self::Failed(qa.reasons)
        }
    }
}

pub struct Orchestrator<'a> {
    config: OrchestratorConfig,
    selector: &'a dyn Selector,
    reviewer: Option<&'a dyn Reviewer>,
    recorder: &'a dyn StepRecorder,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: OrchestratorConfig,
        selector: &'a dyn Selector,
        recorder: &'a dyn StepRecorder,
    ) -> Self {
        Self {
            config,
            selector,
            reviewer: None,
            recorder,
        }
    }

    pub fn with_reviewer(mut self, reviewer: &'a dyn Reviewer) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Run attempts until one is accepted or the cap is reached.
    ///
    /// Returns [`EnrichError::MaxAttemptsExceeded`] when every attempt was
    /// rejected, and a structural validation error immediately when the QA
    /// mode is `fallback` and an attempt fails it.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts, qa_mode = %self.config.qa_mode))]
    pub async fn run(&self, input: &ArticleInput<'_>) -> Result<RunOutcome> {
        let max_attempts = self.config.max_attempts;
        if max_attempts == 0 {
            return Err(EnrichError::config("max_attempts must be at least 1"));
        }
        let mut feedback = AttemptFeedback::default();
        let mut cost = 0.0;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "selection attempt");

            let selected = {
                let request = SelectionRequest {
                    article_text: input.article_text,
                    profile: input.profile,
                    keywords: input.keywords,
                    bucket: input.bucket,
                    brand_rules: input.brand_rules,
                    model: &self.config.model,
                    offline: self.config.offline,
                    previous: feedback.previous(),
                    reject_reasons: feedback.reject_reasons(),
                    avoid_urls: feedback.avoid_urls(),
                };
                self.selector.select(&request).await
            };
            let outcome = match selected {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = match e {
                        EnrichError::Selector(msg) => format!("selector error: {msg}"),
                        other => format!("selector error: {other}"),
                    };
                    warn!(attempt, reason = %reason, "attempt rejected");
                    self.record(
                        &format!("attempt_{attempt}"),
                        json!({"accepted": false, "reasons": [reason.clone()]}),
                    )
                    .await;
                    feedback.reject_reason(reason);
                    continue;
                }
            };
            cost += outcome.cost;
            let selection = outcome.selection;

            let pre_score = prevalidation_score(&selection, input.keywords);
            let pre_ok = pre_score >= self.config.prevalidation_min_score;
            info!(attempt, pre_score, pre_ok, "pre-validation");

            let markdown = render_enriched(input.article_text, &selection, input.keywords);
            let quality = self.judge(&markdown, &selection, input).await?;

            let reasons = match quality {
                Quality::Passed { rating, reasons } if pre_ok => {
                    self.record(
                        &format!("attempt_{attempt}"),
                        attempt_payload(&selection, pre_score, true, &reasons),
                    )
                    .await;
                    self.record(
                        &format!("attempt_{attempt}_accepted"),
                        json!({"rating": rating, "reasons": reasons}),
                    )
                    .await;
                    info!(attempt, cost, "attempt accepted");
                    log_diversity(&feedback);
                    return Ok(RunOutcome {
                        markdown,
                        selection,
                        attempts: attempt,
                        cost,
                        feedback,
                    });
                }
                Quality::Passed { .. } => vec![PREVALIDATION_REASON.to_string()],
                Quality::Failed(mut reasons) => {
                    if !pre_ok {
                        reasons.push(PREVALIDATION_REASON.to_string());
                    }
                    reasons
                }
            };

            warn!(attempt, reasons = %reasons.join("; "), "attempt rejected");
            self.record(
                &format!("attempt_{attempt}"),
                attempt_payload(&selection, pre_score, false, &reasons),
            )
            .await;
            feedback.reject(selection, reasons);
        }

        log_diversity(&feedback);
        error!(attempts = max_attempts, "no attempt accepted");
        Err(EnrichError::MaxAttemptsExceeded {
            attempts: max_attempts,
        })
    }

    /// Apply the configured QA mode. Only `fallback` mode can fail the run.
    async fn judge(
        &self,
        markdown: &str,
        selection: &Selection,
        input: &ArticleInput<'_>,
    ) -> Result<Quality> {
        let structural =
            || validate_output(markdown, selection, input.keywords, self.config.require_keyword_in_anchor);

        match self.config.qa_mode {
            QaMode::Fallback => {
                structural()?;
                Ok(Quality::Passed {
                    rating: None,
                    reasons: Vec::new(),
                })
            }
            QaMode::Auto => {
                let Some(reviewer) = self.reviewer else {
                    return Ok(match structural() {
                        Ok(()) => Quality::Passed {
                            rating: None,
                            reasons: Vec::new(),
                        },
                        Err(e) => Quality::Failed(vec![e.to_string()]),
                    });
                };
                match reviewer
                    .review(markdown, selection, input.keywords, input.brand_rules)
                    .await
                {
                    Ok(qa) => Ok(qa.into()),
                    Err(e) => {
                        warn!(error = %e, "quality review unavailable; using structural validation");
                        Ok(match structural() {
                            Ok(()) => Quality::Passed {
                                rating: None,
                                reasons: Vec::new(),
                            },
                            Err(fe) => {
                                error!(error = %fe, "structural fallback failed");
                                Quality::Failed(vec![format!(
                                    "quality review error and structural fallback failed: {fe}"
                                )])
                            }
                        })
                    }
                }
            }
            QaMode::Ai => {
                let Some(reviewer) = self.reviewer else {
                    return Ok(Quality::Failed(vec![
                        "quality review error: no reviewer configured".into(),
                    ]));
                };
                match reviewer
                    .review(markdown, selection, input.keywords, input.brand_rules)
                    .await
                {
                    Ok(qa) => Ok(qa.into()),
                    Err(e) => {
                        warn!(error = %e, "quality review failed");
                        Ok(Quality::Failed(vec!["quality review error".into()]))
                    }
                }
            }
        }
    }

    async fn record(&self, step: &str, payload: serde_json::Value) {
        if let Err(e) = self.recorder.record(step, payload).await {
            warn!(step, error = %e, "failed to record step");
        }
    }
}

fn attempt_payload(
    selection: &Selection,
    pre_score: u32,
    accepted: bool,
    reasons: &[String],
) -> serde_json::Value {
    json!({
        "hero": selection.hero().url,
        "context": selection.context_item().url,
        "links": selection.links().iter().map(|l| &l.url).collect::<Vec<_>>(),
        "pre_score": pre_score,
        "accepted": accepted,
        "reasons": reasons,
    })
}

fn log_diversity(feedback: &AttemptFeedback) {
    if feedback.history().is_empty() {
        return;
    }
    info!(
        repeat_selection_ratio = %format!("{:.2}%", feedback.repeat_ratio()),
        attempts = feedback.history().len(),
        "diversity metric"
    );
}
