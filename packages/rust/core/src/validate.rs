//! Structural validation and the anchor pre-validation heuristic.

use mdenrich_markdown::text::contains_url;
use mdenrich_shared::{EnrichError, Result, Selection};

/// Anchors that carry no information on their own.
const GENERIC_ANCHORS: [&str; 4] = ["overview", "basics", "learn more", "click here"];
const MIN_ANCHOR_LEN: usize = 8;
const MAX_ANCHOR_LEN: usize = 80;

/// Fail fast on the first missing asset or bad anchor.
///
/// With `require_keyword` every anchor must also contain one of `keywords`
/// (case-insensitive).
pub fn validate_output(
    markdown: &str,
    selection: &Selection,
    keywords: &[String],
    require_keyword: bool,
) -> Result<()> {
    if !contains_url(markdown, &selection.hero().url) {
        return Err(EnrichError::structural(
            "hero_present",
            format!("hero image {} not found in output", selection.hero().url),
        ));
    }
    if !contains_url(markdown, &selection.context_item().url) {
        return Err(EnrichError::structural(
            "context_present",
            format!(
                "context media {} not found in output",
                selection.context_item().url
            ),
        ));
    }
    for link in selection.links() {
        if !contains_url(markdown, &link.url) {
            return Err(EnrichError::structural(
                "link_present",
                format!("link {} missing from output", link.url),
            ));
        }
    }

    let lowered_keywords = lowered(keywords);
    for link in selection.links() {
        let anchor = link.anchor.trim().to_lowercase();
        if anchor.is_empty() {
            return Err(EnrichError::structural(
                "anchor_not_empty",
                format!("anchor for {} is empty", link.url),
            ));
        }
        if anchor.contains("click here") {
            return Err(EnrichError::structural(
                "anchor_not_click_here",
                format!("anchor '{}' uses 'click here'", link.anchor),
            ));
        }
        if require_keyword && !lowered_keywords.iter().any(|k| anchor.contains(k.as_str())) {
            return Err(EnrichError::structural(
                "anchor_has_keyword",
                format!("anchor '{}' contains none of the keywords", link.anchor),
            ));
        }
    }

    tracing::info!("structural validation passed: hero, context and two links present");
    Ok(())
}

/// Anchor quality score: four binary checks per link, summed over both links.
///
/// Checks: a keyword occurs in the anchor; length within 8..=80; at least two
/// purely alphabetic whitespace-separated tokens; not exactly a generic phrase.
pub fn prevalidation_score(selection: &Selection, keywords: &[String]) -> u32 {
    let lowered_keywords = lowered(keywords);
    selection
        .links()
        .iter()
        .map(|link| {
            let anchor = link.anchor.trim();
            let lowered = anchor.to_lowercase();
            let has_keyword = lowered_keywords.iter().any(|k| lowered.contains(k.as_str()));
            let len = anchor.chars().count();
            let length_ok = (MIN_ANCHOR_LEN..=MAX_ANCHOR_LEN).contains(&len);
            let alphabetic = anchor
                .split_whitespace()
                .filter(|t| t.chars().all(char::is_alphabetic))
                .count();
            let specific = !GENERIC_ANCHORS.contains(&lowered.as_str());
            [has_keyword, length_ok, alphabetic >= 2, specific]
                .into_iter()
                .map(u32::from)
                .sum::<u32>()
        })
        .sum()
}

fn lowered(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
