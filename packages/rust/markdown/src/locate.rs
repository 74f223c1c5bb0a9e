//! Anchor location strategies.
//!
//! Each strategy looks for a span of a paragraph that can become the link
//! text. Strategies are tried in order and the first hit wins; when all of
//! them miss, the renderer appends the link to the paragraph instead.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::text::{is_hyphen_variant, word_tokens};

/// Stand-in for an existing link, URL or code span; never matches a needle.
const OPAQUE: char = '\u{FFFC}';

static PROTECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[[^\]]*\]\([^)]*\)|<https?://[^>]+>|https?://[^\s)]+|`[^`]*`")
        .expect("valid regex")
});

/// Which locate strategy produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// First occurrence of the anchor anywhere in the paragraph.
    Paragraph,
    /// First occurrence of the anchor inside the hinted sentence.
    Sentence,
    /// Longest anchor token found in the paragraph.
    Token,
}

impl Strategy {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::Token => "token",
        }
    }
}

type LocateFn = fn(&Matcher<'_>, &str, Option<usize>) -> Option<Range<usize>>;

const STRATEGIES: [(Strategy, LocateFn); 3] = [
    (Strategy::Paragraph, paragraph_literal),
    (Strategy::Sentence, hinted_sentence),
    (Strategy::Token, anchor_token),
];

/// Run the strategies in order and return the first located byte span.
pub(crate) fn locate(
    text: &str,
    anchor: &str,
    sentence_hint: Option<usize>,
) -> Option<(Strategy, Range<usize>)> {
    let matcher = Matcher::new(text);
    STRATEGIES
        .iter()
        .find_map(|&(strategy, run)| run(&matcher, anchor, sentence_hint).map(|s| (strategy, s)))
}

/// Whether the anchor can be linked in place inside `text`.
pub(crate) fn contains_anchor(text: &str, anchor: &str) -> bool {
    let matcher = Matcher::new(text);
    paragraph_literal(&matcher, anchor, None).is_some()
}

fn paragraph_literal(m: &Matcher<'_>, anchor: &str, _: Option<usize>) -> Option<Range<usize>> {
    m.find(anchor, m.full())
}

fn hinted_sentence(m: &Matcher<'_>, anchor: &str, hint: Option<usize>) -> Option<Range<usize>> {
    let sentences = m.sentences();
    let index = hint.filter(|i| *i < sentences.len()).unwrap_or(0);
    let scope = sentences.get(index)?.clone();
    m.find(anchor, scope)
}

fn anchor_token(m: &Matcher<'_>, anchor: &str, _: Option<usize>) -> Option<Range<usize>> {
    let mut tokens: Vec<String> = word_tokens(anchor)
        .into_iter()
        .filter(|t| t.chars().count() >= 3)
        .collect();
    tokens.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    tokens.dedup();
    tokens.iter().find_map(|t| m.find(t, m.full()))
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Case-insensitive matcher over a paragraph.
///
/// Emphasis markers are ignored, dash variants compare equal to `-` and
/// whitespace runs collapse to one space. Every normalized character keeps the
/// byte range it came from so that matches map back onto the original text.
pub(crate) struct Matcher<'a> {
    text: &'a str,
    chars: Vec<char>,
    origin: Vec<Range<usize>>,
    protected: Vec<Range<usize>>,
}

impl<'a> Matcher<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let protected: Vec<Range<usize>> = PROTECTED_RE.find_iter(text).map(|m| m.range()).collect();
        let mut chars = Vec::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len());
        let mut prev_space = false;
        let mut prev_char: Option<char> = None;
        let mut iter = text.char_indices().peekable();

        while let Some((i, ch)) = iter.next() {
            if let Some(range) = protected.iter().find(|r| r.contains(&i)) {
                chars.push(OPAQUE);
                origin.push(range.clone());
                while iter.peek().is_some_and(|&(j, _)| j < range.end) {
                    iter.next();
                }
                prev_space = false;
                prev_char = None;
                continue;
            }
            let next_char = iter.peek().map(|&(_, c)| c);
            let previous = prev_char.replace(ch);
            if is_emphasis(previous, ch, next_char) {
                continue;
            }
            let here = i..i + ch.len_utf8();
            if ch.is_whitespace() {
                if !prev_space {
                    chars.push(' ');
                    origin.push(here);
                    prev_space = true;
                }
                continue;
            }
            prev_space = false;
            let ch = if is_hyphen_variant(ch) { '-' } else { ch };
            for lower in ch.to_lowercase() {
                chars.push(lower);
                origin.push(here.clone());
            }
        }

        Self {
            text,
            chars,
            origin,
            protected,
        }
    }

    fn full(&self) -> Range<usize> {
        0..self.text.len()
    }

    /// First occurrence of `needle` inside `scope`, if it sits on word boundaries.
    fn find(&self, needle: &str, scope: Range<usize>) -> Option<Range<usize>> {
        let needle = normalize_needle(needle);
        let n = needle.len();
        if n == 0 || n > self.chars.len() {
            return None;
        }

        let first = self
            .chars
            .windows(n)
            .enumerate()
            .find(|(i, window)| {
                *window == needle.as_slice()
                    && self.origin[*i].start >= scope.start
                    && self.origin[i + n - 1].end <= scope.end
            })
            .map(|(i, _)| i)?;

        let span = self.origin[first].start..self.origin[first + n - 1].end;
        self.on_word_boundary(&span).then_some(span)
    }

    fn on_word_boundary(&self, span: &Range<usize>) -> bool {
        let before = self.text[..span.start].chars().next_back();
        let after = self.text[span.end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    }

    fn is_protected(&self, offset: usize) -> bool {
        self.protected.iter().any(|r| r.contains(&offset))
    }

    /// Sentence byte ranges, split after `.`, `!` or `?` but never inside a
    /// decimal number such as `0.01`.
    fn sentences(&self) -> Vec<Range<usize>> {
        let chars: Vec<(usize, char)> = self.text.char_indices().collect();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut k = 0;

        while k < chars.len() {
            let (i, ch) = chars[k];
            let decimal_point = ch == '.'
                && k > 0
                && chars[k - 1].1.is_ascii_digit()
                && chars.get(k + 1).is_some_and(|(_, c)| c.is_ascii_digit());
            if matches!(ch, '.' | '!' | '?') && !decimal_point && !self.is_protected(i) {
                spans.push(start..i + 1);
                k += 1;
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                start = chars.get(k).map_or(self.text.len(), |&(j, _)| j);
                continue;
            }
            k += 1;
        }
        if start < self.text.len() {
            spans.push(start..self.text.len());
        }
        spans
    }
}

/// `*` and backticks always; `_` only at a word edge, so `snake_case` stays intact.
fn is_emphasis(prev: Option<char>, ch: char, next: Option<char>) -> bool {
    match ch {
        '*' | '`' => true,
        '_' => !(prev.is_some_and(char::is_alphanumeric) && next.is_some_and(char::is_alphanumeric)),
        _ => false,
    }
}

fn normalize_needle(needle: &str) -> Vec<char> {
    let chars: Vec<char> = needle.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    for (k, &ch) in chars.iter().enumerate() {
        let prev = k.checked_sub(1).map(|p| chars[p]);
        if is_emphasis(prev, ch, chars.get(k + 1).copied()) {
            continue;
        }
        if ch.is_whitespace() {
            if out.last().is_some_and(|c| *c != ' ') {
                out.push(' ');
            }
            continue;
        }
        let ch = if is_hyphen_variant(ch) { '-' } else { ch };
        out.extend(ch.to_lowercase());
    }
    while out.last() == Some(&' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located<'t>(text: &'t str, anchor: &str, hint: Option<usize>) -> Option<(Strategy, &'t str)> {
        locate(text, anchor, hint).map(|(s, r)| (s, &text[r]))
    }

    #[test]
    fn literal_match_is_case_insensitive() {
        let text = "Advances in membrane materials have cut Capture Energy Penalties a lot.";
        assert_eq!(
            located(text, "capture energy penalties", None),
            Some((Strategy::Paragraph, "Capture Energy Penalties"))
        );
    }

    #[test]
    fn matching_ignores_emphasis_and_dash_variants() {
        let text = "1. **Pre\u{2011}combustion separation** \u{2013} Fossil fuel is converted.";
        assert_eq!(
            located(text, "Pre-combustion separation", None),
            Some((Strategy::Paragraph, "Pre\u{2011}combustion separation"))
        );
    }

    #[test]
    fn inner_underscore_is_kept() {
        let text = "Set the snake_case flag or use _emphasis_ here.";
        assert_eq!(
            located(text, "snake_case flag", None),
            Some((Strategy::Paragraph, "snake_case flag"))
        );
        assert_eq!(located(text, "snakecase", None), None);
        assert_eq!(
            located(text, "use emphasis", None),
            Some((Strategy::Paragraph, "use _emphasis"))
        );
    }

    #[test]
    fn matching_collapses_whitespace_across_lines() {
        let text = "Rail freight keeps\n  direct air capture plants supplied.";
        assert_eq!(
            located(text, "keeps direct  air capture", None),
            Some((Strategy::Paragraph, "keeps\n  direct air capture"))
        );
    }

    #[test]
    fn word_boundary_is_required() {
        // "cat" only occurs inside "concatenate"; the token strategy needs 3+ chars
        // and finds nothing either.
        assert_eq!(located("We concatenate strings.", "cat", None), None);
        assert!(!contains_anchor("We concatenate strings.", "cat"));
        assert!(contains_anchor("The cat sat.", "cat"));
    }

    #[test]
    fn existing_links_are_not_matched() {
        let text = "Read [carbon storage](http://x/a) for carbon storage details.";
        let (strategy, span) = locate(text, "carbon storage", None).expect("located");
        assert_eq!(strategy, Strategy::Paragraph);
        assert_eq!(span.start, text.rfind("carbon storage").expect("second occurrence"));
    }

    #[test]
    fn sentence_strategy_uses_hint() {
        // First occurrence fails the boundary check ("xbike"), the hinted
        // sentence holds a clean one.
        let text = "Our xbike lanes grew. Commuters love the bike lanes downtown.";
        assert_eq!(
            located(text, "bike lanes", Some(1)),
            Some((Strategy::Sentence, "bike lanes"))
        );
    }

    #[test]
    fn sentences_do_not_split_decimals() {
        let matcher = Matcher::new("Costs fell to 0.01 per ton. Then rose! Why?");
        let text = "Costs fell to 0.01 per ton. Then rose! Why?";
        let sentences: Vec<&str> = matcher.sentences().into_iter().map(|r| &text[r]).collect();
        assert_eq!(sentences, vec!["Costs fell to 0.01 per ton.", "Then rose!", "Why?"]);
    }

    #[test]
    fn token_strategy_prefers_longest_token() {
        let text = "Pipelines move the molecule to storage sites.";
        assert_eq!(
            located(text, "CO2 storage pipelines guide", None),
            Some((Strategy::Token, "Pipelines"))
        );
    }

    #[test]
    fn nothing_found() {
        assert_eq!(located("Completely unrelated.", "solar panels", Some(0)), None);
    }
}
