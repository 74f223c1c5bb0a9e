//! Deterministic fallback selector.
//!
//! Used offline, without an API key, and whenever the upstream selector
//! fails. Alt text and anchors satisfy the selection invariants by
//! construction; too few link candidates is still a hard error.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, info};

use mdenrich_shared::{
    CandidateAsset, EnrichError, LinkSelection, MediaKind, MediaSelection, Place, Profile, Result,
    Selection,
};

use crate::selector::{SelectionOutcome, SelectionRequest, Selector};

/// Fallback alt text is cut to this many characters.
const ALT_LIMIT: usize = 120;
/// Anchors longer than this are truncated.
const ANCHOR_LIMIT: usize = 60;
/// Keywords at least this long are used bare instead of "{kw} basics".
const SHORT_KEYWORD: usize = 40;
const BANNED_ALT_PREFIXES: [&str; 2] = ["image of", "picture of"];

/// Rule-based [`Selector`] over the first entries of each bucket.
#[derive(Debug, Clone)]
pub struct FallbackSelector {
    section_hints: Vec<String>,
}

impl FallbackSelector {
    /// `section_hints` are lowercase substrings tried in order against the
    /// article headings to pick the target section.
    pub fn new(section_hints: Vec<String>) -> Self {
        Self {
            section_hints: section_hints
                .into_iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Build a selection without any I/O.
    pub fn select_now(&self, request: &SelectionRequest<'_>) -> Result<Selection> {
        let bucket = request.bucket;
        if bucket.hero.is_empty() {
            return Err(EnrichError::Selector("no hero candidates available".into()));
        }
        if request.keywords.is_empty() {
            return Err(EnrichError::Selector("no keywords supplied".into()));
        }

        let hero_pool = prefer_unseen(&bucket.hero, request.avoid_urls, 1);
        let context_pool = prefer_unseen(&bucket.context, request.avoid_urls, 1);
        let link_pool = prefer_unseen(&bucket.links, request.avoid_urls, Selection::LINK_COUNT);

        let hero = hero_pool[0];
        let context = context_pool
            .get(1)
            .or_else(|| context_pool.first())
            .copied()
            .unwrap_or(hero);

        let target = target_heading(request.profile, &self.section_hints);
        debug!(target = ?target, "fallback target heading");

        let hero_sel = MediaSelection {
            id: hero.id,
            kind: MediaKind::Image,
            url: hero.url.clone(),
            alt: fallback_alt(hero, "Hero image"),
            place: Place::default(),
        };
        let context_sel = MediaSelection {
            id: context.id,
            kind: MediaKind::try_from(context.kind)?,
            url: context.url.clone(),
            alt: fallback_alt(context, "Context media"),
            place: Place::in_section(target.clone()),
        };

        let links = link_pool
            .iter()
            .take(Selection::LINK_COUNT)
            .enumerate()
            .map(|(i, link)| {
                let keyword = request.keywords[i % request.keywords.len()].clone();
                LinkSelection {
                    id: link.id,
                    url: link.url.clone(),
                    anchor: fallback_anchor(link, &keyword),
                    keyword,
                    place: Place {
                        section_heading: target.clone(),
                        paragraph_index: Some(0),
                        sentence_index: Some(0),
                        after_heading: true,
                    },
                }
            })
            .collect();

        Selection::new(hero_sel, context_sel, links)
    }
}

#[async_trait]
impl Selector for FallbackSelector {
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<SelectionOutcome> {
        info!("using deterministic fallback selection");
        self.select_now(request).map(SelectionOutcome::free)
    }
}

/// Bucket entries not in `avoid`, unless that leaves fewer than `min`.
fn prefer_unseen<'a>(
    bucket: &'a [CandidateAsset],
    avoid: &BTreeSet<String>,
    min: usize,
) -> Vec<&'a CandidateAsset> {
    let unseen: Vec<&CandidateAsset> = bucket.iter().filter(|a| !avoid.contains(&a.url)).collect();
    if unseen.len() >= min {
        unseen
    } else {
        bucket.iter().collect()
    }
}

/// First heading containing any hint, else the first heading.
pub fn target_heading(profile: &Profile, hints: &[String]) -> Option<String> {
    profile
        .headings
        .iter()
        .find(|h| {
            let lowered = h.to_lowercase();
            hints.iter().any(|hint| lowered.contains(hint.as_str()))
        })
        .or_else(|| profile.headings.first())
        .cloned()
}

fn non_blank(s: Option<&String>) -> Option<&str> {
    s.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Description or title, banned prefix removed, at most 120 characters.
pub fn fallback_alt(asset: &CandidateAsset, default: &str) -> String {
    let mut text = non_blank(asset.description.as_ref())
        .or_else(|| non_blank(asset.title.as_ref()))
        .unwrap_or(default);
    for prefix in BANNED_ALT_PREFIXES {
        if text
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            text = text[prefix.len()..].trim_start();
        }
    }
    let alt: String = text.chars().take(ALT_LIMIT).collect();
    let alt = alt.trim_end();
    if alt.is_empty() {
        default.to_string()
    } else {
        alt.to_string()
    }
}

/// Lowercased title/description when it mentions the keyword, else a short
/// synthesized phrase.
pub fn fallback_anchor(link: &CandidateAsset, keyword: &str) -> String {
    let base = non_blank(link.title.as_ref())
        .or_else(|| non_blank(link.description.as_ref()))
        .unwrap_or("overview")
        .to_lowercase();
    let keyword = keyword.trim();
    if base.contains(&keyword.to_lowercase()) {
        return truncate(&base, ANCHOR_LIMIT);
    }
    if keyword.chars().count() < SHORT_KEYWORD {
        format!("{keyword} basics")
    } else {
        truncate(keyword, ANCHOR_LIMIT)
    }
}

fn truncate(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect::<String>().trim_end().to_string()
}
