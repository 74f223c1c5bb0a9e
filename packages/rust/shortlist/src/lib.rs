//! Candidate shortlisting.
//!
//! Ranks catalog media and link resources against keyword variants derived
//! from the article and splits them into size-bounded hero, context and link
//! buckets. Never invents candidates; buckets may come back empty.

mod score;
mod variants;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, instrument};

use mdenrich_markdown::text::tokenize;
use mdenrich_shared::{AssetKind, CandidateAsset, CandidateBucket, Profile};

pub use score::{authority_weight, score_asset};
pub use variants::{acronym_pairs, initialism, keyword_variants};

/// Media candidates considered for the hero and context buckets.
const TOP_MEDIA: usize = 8;
/// Hero bucket size.
const HERO_SIZE: usize = 5;
/// Context bucket size.
const CONTEXT_SIZE: usize = 5;
/// Link bucket size.
const LINK_SIZE: usize = 6;

/// Union of the variants of every keyword.
pub fn relevance_set(
    article_text: &str,
    profile: &Profile,
    keywords: &[String],
    media: &[CandidateAsset],
    links: &[CandidateAsset],
) -> BTreeSet<String> {
    let article_tokens: HashSet<String> = profile.tokens.iter().cloned().collect();
    let asset_tokens = collect_asset_tokens(media.iter().chain(links));
    let pairs = acronym_pairs(article_text);

    keywords
        .iter()
        .flat_map(|k| keyword_variants(k, &article_tokens, &asset_tokens, &pairs))
        .collect()
}

/// Score, rank and bucket the candidates.
#[instrument(skip_all, fields(keywords = keywords.len(), media = media.len(), links = links.len()))]
pub fn shortlist(
    article_text: &str,
    profile: &Profile,
    keywords: &[String],
    media: &[CandidateAsset],
    links: &[CandidateAsset],
) -> CandidateBucket {
    let variants = relevance_set(article_text, profile, keywords, media, links);
    info!(variants = variants.len(), "keyword variants built");

    let article_tokens: HashSet<String> = profile.tokens.iter().cloned().collect();

    let ranked_media = rank(
        media.iter().filter(|m| m.kind != AssetKind::Resource),
        |m| score_asset(m, &variants, &article_tokens),
    );
    let ranked_links = rank(links.iter(), |l| {
        score_asset(l, &variants, &article_tokens) * authority_weight(l.resource_type.as_deref())
    });

    let top_media: Vec<CandidateAsset> = ranked_media.into_iter().take(TOP_MEDIA).collect();
    let images: Vec<CandidateAsset> = top_media
        .iter()
        .filter(|m| m.kind == AssetKind::Image)
        .cloned()
        .collect();
    let hero_pool = if images.is_empty() { top_media.clone() } else { images };

    let bucket = CandidateBucket {
        hero: hero_pool.into_iter().take(HERO_SIZE).collect(),
        context: top_media.into_iter().take(CONTEXT_SIZE).collect(),
        links: ranked_links.into_iter().take(LINK_SIZE).collect(),
    };

    info!(
        hero = bucket.hero.len(),
        context = bucket.context.len(),
        links = bucket.links.len(),
        "shortlist built"
    );
    bucket
}

/// Stable descending sort by score.
fn rank<'a>(
    assets: impl Iterator<Item = &'a CandidateAsset>,
    score: impl Fn(&CandidateAsset) -> f64,
) -> Vec<CandidateAsset> {
    let mut scored: Vec<(f64, &CandidateAsset)> = assets.map(|a| (score(a), a)).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    for (s, a) in scored.iter().take(3) {
        debug!(id = a.id, url = %a.url, score = s, "top candidate");
    }
    scored.into_iter().map(|(_, a)| a.clone()).collect()
}

fn collect_asset_tokens<'a>(assets: impl Iterator<Item = &'a CandidateAsset>) -> HashSet<String> {
    let mut tokens = HashSet::new();
    for asset in assets {
        tokens.extend(tokenize(asset.title_text()));
        tokens.extend(tokenize(asset.description_text()));
        tokens.extend(tokenize(&asset.tags_text()));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdenrich_markdown::build_profile;

    fn candidate(id: i64, kind: AssetKind, title: &str, resource_type: Option<&str>) -> CandidateAsset {
        CandidateAsset {
            id,
            kind,
            url: format!("http://x/{id}"),
            title: Some(title.into()),
            description: None,
            tags: Vec::new(),
            resource_type: resource_type.map(String::from),
        }
    }

    const ARTICLE: &str = "# Bike commuting\n\n## Why commuters are switching\n\nE-bikes and protected lanes.\n";

    #[test]
    fn ranks_relevant_media_first() {
        let profile = build_profile(ARTICLE);
        let media = vec![
            candidate(1, AssetKind::Image, "Mountain lake", None),
            candidate(2, AssetKind::Image, "Bike commuting at dawn", None),
            candidate(3, AssetKind::Video, "Commuting by bike", None),
        ];
        let bucket = shortlist(ARTICLE, &profile, &["bike commuting".into()], &media, &[]);

        assert_eq!(bucket.hero[0].id, 2);
        assert!(bucket.hero.iter().all(|m| m.kind == AssetKind::Image));
        assert_eq!(bucket.context.len(), 3);
        assert!(bucket.links.is_empty());
    }

    #[test]
    fn hero_falls_back_to_videos_when_no_images() {
        let profile = build_profile(ARTICLE);
        let media = vec![candidate(7, AssetKind::Video, "Bike lanes", None)];
        let bucket = shortlist(ARTICLE, &profile, &["bike".into()], &media, &[]);
        assert_eq!(bucket.hero.len(), 1);
        assert_eq!(bucket.hero[0].kind, AssetKind::Video);
    }

    #[test]
    fn authority_breaks_even_scores() {
        let profile = build_profile(ARTICLE);
        let links = vec![
            candidate(10, AssetKind::Resource, "Bike lanes", Some("blog")),
            candidate(11, AssetKind::Resource, "Bike lanes", Some("report")),
        ];
        let bucket = shortlist(ARTICLE, &profile, &["bike".into()], &[], &links);
        assert_eq!(bucket.links[0].id, 11);
        assert_eq!(bucket.links[1].id, 10);
    }

    #[test]
    fn bucket_sizes_are_bounded() {
        let profile = build_profile(ARTICLE);
        let media: Vec<CandidateAsset> = (0..12)
            .map(|i| candidate(i, AssetKind::Image, "Bike", None))
            .collect();
        let links: Vec<CandidateAsset> = (100..110)
            .map(|i| candidate(i, AssetKind::Resource, "Bike", None))
            .collect();
        let bucket = shortlist(ARTICLE, &profile, &["bike".into()], &media, &links);
        assert_eq!(bucket.hero.len(), 5);
        assert_eq!(bucket.context.len(), 5);
        assert_eq!(bucket.links.len(), 6);
        // Equal scores keep catalog order.
        assert_eq!(bucket.hero[0].id, 0);
        assert_eq!(bucket.links[5].id, 105);
    }

    #[test]
    fn empty_catalog_gives_empty_buckets() {
        let profile = build_profile(ARTICLE);
        let bucket = shortlist(ARTICLE, &profile, &["bike".into()], &[], &[]);
        assert_eq!(bucket, CandidateBucket::default());
    }
}
