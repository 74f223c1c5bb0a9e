//! Keyword variant expansion.
//!
//! A keyword such as "direct air capture" also matches "direct-air-capture",
//! "directaircapture", "direct air captures", the acronym "dac" when the
//! article defines it, and near spellings found in the article or catalog.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use similar::TextDiff;

use mdenrich_markdown::text::normalize_text;

/// Words skipped when building initialisms.
const STOPWORDS: [&str; 10] = ["and", "of", "to", "for", "the", "a", "an", "in", "on", "with"];

/// Minimum similarity ratio for a fuzzy variant.
const FUZZY_RATIO: f32 = 0.82;

/// Longest variant kept.
const MAX_VARIANT_LEN: usize = 60;

static ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("valid regex"));

static LONGFORM_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z][A-Za-z \-]{2,})\s*\(([A-Z]{2,6})\)").expect("valid regex")
});

static ACRONYM_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2,6})\s*\(([A-Za-z][A-Za-z \-]{2,})\)").expect("valid regex")
});

/// First letters of the non-stopword words of `phrase`, lower-cased.
pub fn initialism(phrase: &str) -> String {
    let lowered = phrase.to_lowercase();
    ALNUM_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| !STOPWORDS.contains(w))
        .filter_map(|w| w.chars().next())
        .collect()
}

/// Acronym/longform pairs defined in the text, mapped both ways.
///
/// Recognizes "Direct Air Capture (DAC)" and "DAC (direct air capture)". A
/// pair only counts when the initials of the whole captured longform spell
/// the acronym, so "Advances in Direct Air Capture (DAC)" defines nothing.
pub fn acronym_pairs(text: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();

    for caps in LONGFORM_FIRST_RE.captures_iter(text) {
        add_pair(&mut pairs, &caps[2], &caps[1]);
    }
    for caps in ACRONYM_FIRST_RE.captures_iter(text) {
        add_pair(&mut pairs, &caps[1], &caps[2]);
    }
    pairs
}

fn add_pair(pairs: &mut HashMap<String, String>, acronym: &str, longform: &str) {
    let acronym = acronym.to_lowercase();
    let longform = normalize_text(longform);
    if initialism(&longform) == acronym {
        pairs.insert(longform.clone(), acronym.clone());
        pairs.insert(acronym, longform);
    }
}

/// Every variant of `keyword` worth matching against candidate metadata.
pub fn keyword_variants(
    keyword: &str,
    article_tokens: &HashSet<String>,
    asset_tokens: &HashSet<String>,
    pairs: &HashMap<String, String>,
) -> BTreeSet<String> {
    let base = normalize_text(keyword);
    let words: Vec<&str> = ALNUM_RE.find_iter(&base).map(|m| m.as_str()).collect();

    let mut variants = BTreeSet::new();
    variants.insert(base.clone());

    if let Some((last, head)) = words.split_last() {
        variants.insert(words.join("-"));
        variants.insert(words.join(" "));
        variants.insert(words.concat());

        let plural = match last.strip_suffix('y') {
            Some(stem) if !stem.is_empty() => format!("{stem}ies"),
            _ => format!("{last}s"),
        };
        let mut plural_words: Vec<&str> = head.to_vec();
        plural_words.push(&plural);
        variants.insert(plural_words.join(" "));
    }

    if let Some(pair) = pairs.get(&base) {
        variants.insert(pair.clone());
    }

    if words.len() > 1 {
        let acronym = initialism(&base);
        if asset_tokens.contains(&acronym) || article_tokens.contains(&acronym) {
            variants.insert(acronym);
        }
    }

    let compact = base.replace(' ', "");
    for candidate in asset_tokens.union(article_tokens) {
        if candidate.chars().count() < 3 {
            continue;
        }
        if TextDiff::from_chars(candidate.as_str(), compact.as_str()).ratio() >= FUZZY_RATIO {
            variants.insert(candidate.clone());
        }
    }

    variants
        .into_iter()
        .map(|v| normalize_text(&v))
        .filter(|v| (1..=MAX_VARIANT_LEN).contains(&v.chars().count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn initialism_skips_stopwords() {
        assert_eq!(initialism("Carbon Capture and Storage"), "ccs");
        assert_eq!(initialism("the Department of Energy"), "de");
    }

    #[test]
    fn acronym_pairs_both_directions() {
        let text = "Direct Air Capture (DAC) matters. CCS (carbon capture and storage) too.";
        let pairs = acronym_pairs(text);
        assert_eq!(pairs.get("dac").map(String::as_str), Some("direct air capture"));
        assert_eq!(pairs.get("direct air capture").map(String::as_str), Some("dac"));
        assert_eq!(pairs.get("ccs").map(String::as_str), Some("carbon capture and storage"));
    }

    #[test]
    fn longform_must_match_in_full() {
        // The pattern sweeps up "Advances in", whose initials break the match.
        let pairs = acronym_pairs("Advances in Direct Air Capture (DAC) matter.");
        assert!(pairs.is_empty());
    }

    #[test]
    fn fuzzy_threshold_boundary() {
        let empty = HashSet::new();
        // 2 * 7 / (7 + 10) = 0.8235
        let assets = set(&["storagebin"]);
        let variants = keyword_variants("storage", &empty, &assets, &HashMap::new());
        assert!(variants.contains("storagebin"));

        // 2 * 9 / (9 + 13) = 0.8182
        let assets = set(&["pipelinestudy"]);
        let variants = keyword_variants("pipelines", &empty, &assets, &HashMap::new());
        assert!(!variants.contains("pipelinestudy"));
    }

    #[test]
    fn mismatched_initials_are_ignored() {
        let pairs = acronym_pairs("Something unrelated (XYZ) here.");
        assert!(pairs.is_empty());
    }

    #[test]
    fn spelling_and_plural_variants() {
        let empty = HashSet::new();
        let variants = keyword_variants("Bike Commuting", &empty, &empty, &HashMap::new());
        assert!(variants.contains("bike commuting"));
        assert!(variants.contains("bike-commuting"));
        assert!(variants.contains("bikecommuting"));
        assert!(variants.contains("bike commutings"));

        let variants = keyword_variants("battery", &empty, &empty, &HashMap::new());
        assert!(variants.contains("batteries"));
    }

    #[test]
    fn acronym_variant_requires_presence() {
        let article = set(&["ccs", "storage"]);
        let empty = HashSet::new();
        let variants = keyword_variants("carbon capture storage", &article, &empty, &HashMap::new());
        assert!(variants.contains("ccs"));

        let variants = keyword_variants("carbon capture storage", &empty, &empty, &HashMap::new());
        assert!(!variants.contains("ccs"));
    }

    #[test]
    fn pair_and_fuzzy_variants() {
        let pairs = acronym_pairs("We study direct air capture (DAC).");
        let empty = HashSet::new();
        let variants = keyword_variants("DAC", &empty, &empty, &pairs);
        assert!(variants.contains("direct air capture"));

        let assets = set(&["ebikes", "zebra"]);
        let variants = keyword_variants("e-bike", &empty, &assets, &HashMap::new());
        assert!(variants.contains("ebikes"));
        assert!(!variants.contains("zebra"));
    }
}
