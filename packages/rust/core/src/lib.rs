//! Core enrichment logic for mdenrich.
//!
//! Ties the profile, shortlist and probe crates together with candidate
//! selection, quality review and the retry loop into the end-to-end
//! [`pipeline::enrich`] workflow.

pub mod fallback;
pub mod openrouter;
pub mod orchestrator;
pub mod pipeline;
pub mod recorder;
pub mod review;
pub mod selector;
pub mod source;
pub mod validate;

pub use fallback::FallbackSelector;
pub use openrouter::{OpenRouterClient, OpenRouterReviewer, OpenRouterSelector};
pub use orchestrator::{ArticleInput, AttemptFeedback, Orchestrator, OrchestratorConfig, RunOutcome};
pub use pipeline::{
    Collaborators, EnrichRequest, EnrichResult, ProgressReporter, SilentProgress, enrich,
    enrich_with, journal_path, shortlist_article,
};
pub use recorder::{JournalRecorder, NoopRecorder, StepRecorder};
pub use review::Reviewer;
pub use selector::{SelectionOutcome, SelectionRequest, Selector};
pub use source::{CandidateSource, StaticCandidates};
pub use validate::{prevalidation_score, validate_output};
