//! Enriched Markdown rendering.
//!
//! Inserts the hero block after the first H1, the context block after its
//! target heading, then splices each link into a paragraph of its target
//! section using the strategies in [`crate::locate`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use mdenrich_shared::{LinkSelection, MediaKind, MediaSelection, Selection};

use crate::locate::{self, contains_anchor};
use crate::text::{contains_url, parse_heading, word_tokens};

static NUMBERED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s").expect("valid regex"));

/// Render the selection into the article.
///
/// Every URL of the selection appears at least once in the output; a link
/// whose URL is already in the document is never inserted a second time.
#[instrument(skip_all, fields(hero = %selection.hero().url, links = selection.links().len()))]
pub fn render_enriched(markdown: &str, selection: &Selection, keywords: &[String]) -> String {
    let mut doc = Document::parse(markdown);

    doc.place_media(selection);

    let context_heading = selection.context_item().place.section_heading.as_deref();
    let mut used: HashMap<Option<usize>, BTreeSet<usize>> = HashMap::new();

    for link in selection.links() {
        let target = link.place.section_heading.as_deref().or(context_heading);
        if doc.contains_url(&link.url) {
            debug!(url = %link.url, "link already present, skipping");
            continue;
        }
        let key = doc.section_key(target);
        let section_used = used.entry(key).or_default();
        let chosen = doc.place_link(link, target, keywords, section_used);
        section_used.insert(chosen);
    }

    for link in selection.links() {
        if doc.contains_url(&link.url) {
            continue;
        }
        let target = link.place.section_heading.as_deref().or(context_heading);
        let bounds = doc.section_bounds(target);
        doc.append_to_section(bounds, link_markup(&link.anchor, &link.url));
        warn!(
            url = %link.url,
            heading = target.unwrap_or(""),
            "link missing after placement, appended at section end"
        );
    }

    doc.into_markdown()
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

fn link_markup(text: &str, url: &str) -> String {
    format!("[{text}]({url})")
}

fn media_block(media: &MediaSelection) -> String {
    match media.kind {
        MediaKind::Image => format!("![{}]({})", media.alt, media.url),
        MediaKind::Video => {
            let text = media.alt.trim();
            let text = text.strip_suffix('.').map_or(text, str::trim);
            let text = if text.is_empty() { "Watch" } else { text };
            format!("\u{25B6} [{text}]({})", media.url)
        }
    }
}

fn is_media_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("\u{25B6} ") || trimmed.starts_with("![")
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("* ")
        || trimmed.starts_with("- ")
        || trimmed.starts_with("+ ")
        || NUMBERED_ITEM_RE.is_match(trimmed)
}

fn is_separator(line: &str) -> bool {
    line.trim().is_empty() || is_media_line(line)
}

fn is_continuation(line: &str) -> bool {
    !is_separator(line) && !is_list_item(line) && (line.starts_with("  ") || line.starts_with('\t'))
}

/// Splice `[span](url)` into `text`, keeping a possessive suffix outside the link.
fn splice_link(text: &str, span: Range<usize>, url: &str) -> String {
    let (before, rest) = text.split_at(span.start);
    let (middle, after) = rest.split_at(span.end - span.start);
    let (middle, possessive) = split_possessive(middle);
    let middle = middle.replace('\n', " ");
    format!("{before}[{middle}]({url}){possessive}{after}")
}

fn split_possessive(text: &str) -> (&str, &str) {
    for suffix in ["'s", "\u{2019}s"] {
        if let Some(stem) = text.strip_suffix(suffix) {
            if !stem.trim().is_empty() {
                return (stem, &text[stem.len()..]);
            }
        }
    }
    (text, "")
}

/// Paragraph relevance: 2 x keyword tokens + anchor tokens + all-keyword tokens present.
fn paragraph_score(text: &str, keyword: &str, keywords: &[String], anchor: &str) -> usize {
    let present: HashSet<String> = word_tokens(text).into_iter().collect();
    let overlap = |tokens: HashSet<String>| tokens.iter().filter(|t| present.contains(*t)).count();

    let keyword_tokens: HashSet<String> = word_tokens(keyword).into_iter().collect();
    let anchor_tokens: HashSet<String> = word_tokens(anchor).into_iter().collect();
    let global_tokens: HashSet<String> = keywords.iter().flat_map(|k| word_tokens(k)).collect();

    2 * overlap(keyword_tokens) + overlap(anchor_tokens) + overlap(global_tokens)
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

struct Document {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl Document {
    fn parse(markdown: &str) -> Self {
        Self {
            lines: markdown.lines().map(String::from).collect(),
            trailing_newline: markdown.ends_with('\n'),
        }
    }

    fn into_markdown(self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !out.is_empty() {
            out.push('\n');
        }
        out
    }

    fn contains_url(&self, url: &str) -> bool {
        self.lines.iter().any(|l| contains_url(l, url))
    }

    fn first_h1(&self) -> Option<usize> {
        self.lines.iter().position(|l| l.starts_with("# "))
    }

    /// Heading line matching `target`: exact (case-insensitive) first, then substring.
    fn find_heading(&self, target: Option<&str>) -> Option<usize> {
        let target = target.map(str::trim).filter(|t| !t.is_empty())?.to_lowercase();
        let headings: Vec<(usize, String)> = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| parse_heading(l).map(|(_, text)| (i, text.trim().to_lowercase())))
            .collect();

        headings
            .iter()
            .find(|(_, h)| *h == target)
            .or_else(|| headings.iter().find(|(_, h)| h.contains(&target)))
            .map(|(i, _)| *i)
    }

    /// Ordinal of the heading `target` resolves to, with the same fallback to
    /// the final section as [`Self::section_bounds`]. Stable while blocks are
    /// inserted, since no headings are ever added.
    fn section_key(&self, target: Option<&str>) -> Option<usize> {
        let line = self.find_heading(target).or_else(|| {
            self.lines.iter().rposition(|l| parse_heading(l).is_some())
        })?;
        Some(
            self.lines[..line]
                .iter()
                .filter(|l| parse_heading(l).is_some())
                .count(),
        )
    }

    /// Content line range of the target section; the final section when the
    /// heading is absent.
    fn section_bounds(&self, target: Option<&str>) -> Range<usize> {
        let start = match self.find_heading(target) {
            Some(h) => h + 1,
            None => self
                .lines
                .iter()
                .rposition(|l| parse_heading(l).is_some())
                .map_or(0, |h| h + 1),
        };
        let end = (start..self.lines.len())
            .find(|&i| parse_heading(&self.lines[i]).is_some())
            .unwrap_or(self.lines.len());
        start..end
    }

    /// Paragraph line ranges inside `bounds`. List items are their own
    /// paragraphs and absorb indented continuation lines.
    fn paragraphs(&self, bounds: Range<usize>) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut i = bounds.start;
        while i < bounds.end {
            let line = &self.lines[i];
            if is_separator(line) {
                i += 1;
                continue;
            }
            let mut j = i + 1;
            if is_list_item(line) {
                while j < bounds.end && is_continuation(&self.lines[j]) {
                    j += 1;
                }
            } else {
                while j < bounds.end && !is_separator(&self.lines[j]) && !is_list_item(&self.lines[j]) {
                    j += 1;
                }
            }
            out.push(i..j);
            i = j;
        }
        out
    }

    fn paragraph_text(&self, range: &Range<usize>) -> String {
        self.lines[range.clone()].join("\n")
    }

    /// Insert `block` after line `index`, padded with blank lines where needed.
    /// Returns the block's line index.
    fn insert_block_after(&mut self, index: usize, block: String) -> usize {
        self.insert_block_at(index + 1, block)
    }

    fn insert_block_at(&mut self, at: usize, block: String) -> usize {
        let mut insert = Vec::with_capacity(3);
        if at > 0 && !self.lines[at - 1].trim().is_empty() {
            insert.push(String::new());
        }
        let block_line = at + insert.len();
        insert.push(block);
        if self.lines.get(at).is_some_and(|l| !l.trim().is_empty()) {
            insert.push(String::new());
        }
        self.lines.splice(at..at, insert);
        block_line
    }

    fn append_block(&mut self, block: String) -> usize {
        let at = self.lines.len();
        self.insert_block_at(at, block)
    }

    /// Add `block` as a new paragraph after the last non-blank line of the section.
    fn append_to_section(&mut self, bounds: Range<usize>, block: String) -> usize {
        let at = (bounds.start..bounds.end)
            .rev()
            .find(|&i| !self.lines[i].trim().is_empty())
            .map_or(bounds.start, |i| i + 1);
        self.insert_block_at(at, block)
    }

    fn place_media(&mut self, selection: &Selection) {
        let hero = selection.hero();
        let h1 = self.first_h1();
        let hero_line = match h1 {
            Some(i) => self.insert_block_after(i, media_block(hero)),
            None => self.insert_block_at(0, media_block(hero)),
        };
        info!(line = hero_line, after_h1 = h1.is_some(), "hero inserted");

        let context = selection.context_item();
        let heading = self.find_heading(context.place.section_heading.as_deref());
        let context_line = match heading {
            // Keep the hero directly under the title when both target it.
            Some(i) if Some(i) == h1 => self.insert_block_after(hero_line, media_block(context)),
            Some(i) => self.insert_block_after(i, media_block(context)),
            None => self.append_block(media_block(context)),
        };
        info!(
            line = context_line,
            heading = context.place.section_heading.as_deref().unwrap_or(""),
            kind = ?context.kind,
            "context media inserted"
        );
    }

    /// Place one link in its target section; returns the paragraph index used.
    fn place_link(
        &mut self,
        link: &LinkSelection,
        target: Option<&str>,
        keywords: &[String],
        used: &BTreeSet<usize>,
    ) -> usize {
        let bounds = self.section_bounds(target);
        let paragraphs = self.paragraphs(bounds.clone());

        let Some(index) = self.choose_paragraph(&paragraphs, link, keywords, used) else {
            self.append_to_section(bounds, link_markup(&link.anchor, &link.url));
            info!(
                url = %link.url,
                heading = target.unwrap_or(""),
                "no free paragraph, link added as a new paragraph"
            );
            return paragraphs.len();
        };

        let range = paragraphs[index].clone();
        let text = self.paragraph_text(&range);
        let rendered = match locate::locate(&text, &link.anchor, link.place.sentence_index) {
            Some((strategy, span)) => {
                info!(
                    url = %link.url,
                    paragraph = index,
                    strategy = strategy.as_str(),
                    linked = &text[span.clone()],
                    "link inserted"
                );
                splice_link(&text, span, &link.url)
            }
            None => {
                warn!(
                    url = %link.url,
                    paragraph = index,
                    anchor = %link.anchor,
                    "anchor not found, link appended to paragraph"
                );
                let trimmed = text.trim_end();
                format!("{trimmed} {}", link_markup(&link.anchor, &link.url))
            }
        };

        self.lines
            .splice(range, rendered.split('\n').map(String::from).collect::<Vec<_>>());
        index
    }

    fn choose_paragraph(
        &self,
        paragraphs: &[Range<usize>],
        link: &LinkSelection,
        keywords: &[String],
        used: &BTreeSet<usize>,
    ) -> Option<usize> {
        let texts: Vec<String> = paragraphs.iter().map(|r| self.paragraph_text(r)).collect();
        let count = texts.len();
        let free = move || (0..count).filter(move |i| !used.contains(i));
        let hint = link
            .place
            .paragraph_index
            .filter(|i| *i < texts.len() && !used.contains(i));

        if let Some(h) = hint {
            if contains_anchor(&texts[h], &link.anchor) {
                return Some(h);
            }
        }
        if let Some(i) = free().find(|&i| contains_anchor(&texts[i], &link.anchor)) {
            return Some(i);
        }
        if hint.is_some() {
            return hint;
        }

        let mut best: Option<(usize, usize)> = None;
        for i in free() {
            let score = paragraph_score(&texts[i], &link.keyword, keywords, &link.anchor);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }
}
