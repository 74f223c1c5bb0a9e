//! Text normalization and tokenization helpers.
//!
//! Shared by the profiler, the renderer and the shortlister so that every
//! component agrees on what a heading, a token and a word are.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid regex"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9-]+").expect("valid regex"));

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+(?:-[A-Za-z0-9]+)?").expect("valid regex"));

/// Parse an ATX heading line into `(level, text)`.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let caps = HEADING_RE.captures(line)?;
    let level = u8::try_from(caps.get(1)?.as_str().len()).ok()?;
    let text = caps.get(2)?.as_str().trim_end();
    Some((level, text))
}

/// Collapse whitespace runs, trim and lowercase.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lower-cased `[a-z0-9-]+` runs of the normalized text.
pub fn tokenize(s: &str) -> Vec<String> {
    let normalized = normalize_text(s);
    TOKEN_RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Lower-cased words, allowing a single inner hyphen ("pre-combustion").
pub fn word_tokens(s: &str) -> Vec<String> {
    WORD_RE
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Unicode dashes and the minus sign, all matched as `-`.
pub fn is_hyphen_variant(c: char) -> bool {
    matches!(c, '\u{2010}'..='\u{2014}' | '\u{2212}')
}

/// Whether `url` occurs in `text` as a whole URL, not as the prefix of a
/// longer one (`https://x/report` inside `https://x/report-2024`).
pub fn contains_url(text: &str, url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    text.match_indices(url).any(|(i, _)| {
        let mut rest = text[i + url.len()..].chars();
        match rest.next() {
            None => true,
            // Sentence punctuation right after a bare URL.
            Some('.' | ',' | ';' | ':' | '!') => rest.next().is_none_or(char::is_whitespace),
            Some(c) => !(c.is_alphanumeric() || "-_/?#=&%~+@.".contains(c)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_parsing() {
        assert_eq!(parse_heading("# Title"), Some((1, "Title")));
        assert_eq!(parse_heading("### Storage  "), Some((3, "Storage")));
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("####### seven"), None);
        assert_eq!(parse_heading("plain text"), None);
    }

    #[test]
    fn tokenize_keeps_hyphens() {
        assert_eq!(
            tokenize("Direct  Air-Capture (DAC), 2024!"),
            vec!["direct", "air-capture", "dac", "2024"]
        );
    }

    #[test]
    fn word_tokens_single_hyphen() {
        assert_eq!(
            word_tokens("Pre-combustion CO2 re-use-case"),
            vec!["pre-combustion", "co2", "re-use", "case"]
        );
    }

    #[test]
    fn hyphen_variants() {
        assert!(is_hyphen_variant('\u{2011}'));
        assert!(is_hyphen_variant('\u{2014}'));
        assert!(is_hyphen_variant('\u{2212}'));
        assert!(!is_hyphen_variant('-'));
    }

    #[test]
    fn url_prefix_of_longer_url_is_not_contained() {
        let text = "See [the report](https://l.example/report-2024) first.";
        assert!(contains_url(text, "https://l.example/report-2024"));
        assert!(!contains_url(text, "https://l.example/report"));
        assert!(!contains_url("https://l.example/report/2024", "https://l.example/report"));
        assert!(contains_url("Read https://l.example/report.", "https://l.example/report"));
        assert!(contains_url("<https://l.example/report>", "https://l.example/report"));
        assert!(!contains_url("anything", "  "));
    }
}
