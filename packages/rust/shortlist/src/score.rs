//! Candidate relevance scoring.

use std::collections::{BTreeSet, HashSet};

use mdenrich_markdown::text::tokenize;
use mdenrich_shared::CandidateAsset;

/// Bonus when both title and description mention a variant.
const TITLE_AND_DESCRIPTION_BONUS: f64 = 1.5;

/// Authority multiplier for a link resource category.
pub fn authority_weight(resource_type: Option<&str>) -> f64 {
    match resource_type.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("report") => 2.2,
        Some("research") => 2.0,
        Some("fact sheet") => 1.8,
        Some("guide") => 1.6,
        Some("policy") => 1.5,
        Some("data") => 1.4,
        Some("article") => 1.2,
        _ => 1.0,
    }
}

/// Whether a metadata token counts as a hit for a keyword variant.
///
/// Equal tokens always match; containment either way counts only when the
/// shorter side has at least three characters.
fn token_matches(token: &str, variant: &str) -> bool {
    if token == variant {
        return true;
    }
    let (short, long) = if token.len() <= variant.len() {
        (token, variant)
    } else {
        (variant, token)
    };
    short.chars().count() >= 3 && long.contains(short)
}

/// Relevance of one candidate against the keyword variants and article tokens.
pub fn score_asset(
    asset: &CandidateAsset,
    variants: &BTreeSet<String>,
    article_tokens: &HashSet<String>,
) -> f64 {
    let title: HashSet<String> = tokenize(asset.title_text()).into_iter().collect();
    let description: HashSet<String> = tokenize(asset.description_text()).into_iter().collect();
    let tags: HashSet<String> = tokenize(&asset.tags_text()).into_iter().collect();

    let all: HashSet<&String> = title.iter().chain(&description).chain(&tags).collect();

    let keyword_hits = all
        .iter()
        .filter(|t| variants.iter().any(|v| token_matches(t, v)))
        .count();
    let article_hits = all.iter().filter(|t| article_tokens.contains(**t)).count();

    let mut score = 2.0 * keyword_hits as f64 + article_hits as f64;

    let title_hit = title.iter().any(|t| variants.contains(t));
    let description_hit = description.iter().any(|t| variants.contains(t));
    if title_hit && description_hit {
        score += TITLE_AND_DESCRIPTION_BONUS;
    }
    score
}
