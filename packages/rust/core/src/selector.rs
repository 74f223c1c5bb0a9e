//! Selector contract: turns a shortlist into one attempt's [`Selection`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use mdenrich_shared::{CandidateBucket, Profile, Result, Selection};

/// Everything a selector sees for one attempt.
///
/// `previous`, `reject_reasons` and `avoid_urls` carry the feedback of the
/// attempts rejected so far; they are empty on the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub article_text: &'a str,
    pub profile: &'a Profile,
    pub keywords: &'a [String],
    pub bucket: &'a CandidateBucket,
    pub brand_rules: &'a str,
    pub model: &'a str,
    pub offline: bool,
    pub previous: Option<&'a Selection>,
    pub reject_reasons: &'a [String],
    pub avoid_urls: &'a BTreeSet<String>,
}

/// A selection plus the estimated upstream cost of producing it (USD).
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub selection: Selection,
    pub cost: f64,
}

impl SelectionOutcome {
    pub fn free(selection: Selection) -> Self {
        Self {
            selection,
            cost: 0.0,
        }
    }
}

/// Produces a [`Selection`] or fails explicitly. Implementations must never
/// return a selection that violates the data-model invariants.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<SelectionOutcome>;
}
