//! Core domain types for mdenrich enrichment runs.

use serde::{Deserialize, Serialize};

use crate::error::{EnrichError, Result};

/// Maximum alt text length (in characters) for hero and context media.
pub const MAX_ALT_LEN: usize = 125;

/// Alt text prefixes rejected by the accessibility rules.
const BANNED_ALT_PREFIXES: [&str; 2] = ["image of", "picture of"];

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// One heading-delimited section of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text without the leading `#` markers (`None` for a preamble).
    pub heading: Option<String>,
    /// Heading level 1..=6.
    pub level: Option<u8>,
    /// Raw content lines up to the next heading.
    pub content: Vec<String>,
}

/// Structural summary of an article, built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Sections in document order.
    pub sections: Vec<Section>,
    /// Heading texts in document order.
    pub headings: Vec<String>,
    /// Lower-cased alphanumeric/hyphenated tokens of the whole document.
    pub tokens: Vec<String>,
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Kind of a catalog asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Resource,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Resource => "resource",
        }
    }
}

/// A media item or link resource offered by a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAsset {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Authority category for link resources ("report", "guide", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

impl CandidateAsset {
    /// Title or an empty string.
    pub fn title_text(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    /// Description or an empty string.
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Tags joined by spaces, for tokenization.
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }
}

/// Ranked, size-bounded candidate shortlists per asset role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateBucket {
    pub hero: Vec<CandidateAsset>,
    pub context: Vec<CandidateAsset>,
    pub links: Vec<CandidateAsset>,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Kind of a selected media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl TryFrom<AssetKind> for MediaKind {
    type Error = EnrichError;

    fn try_from(kind: AssetKind) -> Result<Self> {
        match kind {
            AssetKind::Image => Ok(Self::Image),
            AssetKind::Video => Ok(Self::Video),
            AssetKind::Resource => Err(EnrichError::validation(
                "a link resource cannot be placed as media",
            )),
        }
    }
}

/// Advisory location hint for a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_index: Option<usize>,
    #[serde(default = "default_true")]
    pub after_heading: bool,
}

impl Default for Place {
    fn default() -> Self {
        Self {
            section_heading: None,
            paragraph_index: None,
            sentence_index: None,
            after_heading: true,
        }
    }
}

impl Place {
    /// A hint pointing at a section heading only.
    pub fn in_section(heading: Option<String>) -> Self {
        Self {
            section_heading: heading,
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}

/// A chosen hero or in-context media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSelection {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub alt: String,
    #[serde(default)]
    pub place: Place,
}

impl MediaSelection {
    /// Check the alt text rules: 1..=125 characters, no "image of"/"picture of" prefix.
    pub fn validate_alt(&self) -> Result<()> {
        let len = self.alt.chars().count();
        if len == 0 || len > MAX_ALT_LEN {
            return Err(EnrichError::validation(format!(
                "alt text for {} must be 1..={MAX_ALT_LEN} characters (got {len})",
                self.url
            )));
        }
        let lowered = self.alt.trim().to_lowercase();
        if BANNED_ALT_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return Err(EnrichError::validation(
                "alt text must not start with 'Image of' or 'Picture of'",
            ));
        }
        Ok(())
    }
}

/// A chosen hyperlink and its anchor text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSelection {
    pub id: i64,
    pub url: String,
    pub anchor: String,
    pub keyword: String,
    #[serde(default)]
    pub place: Place,
}

/// Unchecked wire shape; every deserialized [`Selection`] goes through [`Selection::new`].
#[derive(Deserialize)]
struct SelectionWire {
    hero: MediaSelection,
    context_item: MediaSelection,
    links: Vec<LinkSelection>,
}

/// One attempt's complete enrichment choice.
///
/// Only constructible through [`Selection::new`], which enforces exactly two
/// links and valid alt text on both media items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionWire")]
pub struct Selection {
    hero: MediaSelection,
    context_item: MediaSelection,
    links: Vec<LinkSelection>,
}

impl TryFrom<SelectionWire> for Selection {
    type Error = EnrichError;

    fn try_from(wire: SelectionWire) -> Result<Self> {
        Self::new(wire.hero, wire.context_item, wire.links)
    }
}

impl Selection {
    /// Number of links every selection must carry.
    pub const LINK_COUNT: usize = 2;

    /// Build a selection, rejecting any invariant violation.
    pub fn new(
        hero: MediaSelection,
        context_item: MediaSelection,
        links: Vec<LinkSelection>,
    ) -> Result<Self> {
        if links.len() != Self::LINK_COUNT {
            return Err(EnrichError::validation(format!(
                "exactly two links are required (got {})",
                links.len()
            )));
        }
        hero.validate_alt()?;
        context_item.validate_alt()?;
        Ok(Self {
            hero,
            context_item,
            links,
        })
    }

    pub fn hero(&self) -> &MediaSelection {
        &self.hero
    }

    pub fn context_item(&self) -> &MediaSelection {
        &self.context_item
    }

    pub fn links(&self) -> &[LinkSelection] {
        &self.links
    }

    /// Replace the links, re-checking the link-count invariant.
    pub fn with_links(self, links: Vec<LinkSelection>) -> Result<Self> {
        Self::new(self.hero, self.context_item, links)
    }

    /// Every URL this selection places: hero, context item, then links.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls = vec![self.hero.url.as_str(), self.context_item.url.as_str()];
        urls.extend(self.links.iter().map(|l| l.url.as_str()));
        urls
    }
}

// ---------------------------------------------------------------------------
// QaResult
// ---------------------------------------------------------------------------

/// Verdict returned by a quality reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    #[serde(default)]
    pub accepted: Option<bool>,
    /// Rating on a 0..=10 scale.
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

fn default_threshold() -> u8 {
    7
}

impl QaResult {
    /// Accepted explicitly, or rated at or above the threshold.
    pub fn passed(&self) -> bool {
        self.accepted == Some(true) || self.rating.is_some_and(|r| r >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(url: &str, alt: &str) -> MediaSelection {
        MediaSelection {
            id: 1,
            kind: MediaKind::Image,
            url: url.into(),
            alt: alt.into(),
            place: Place::default(),
        }
    }

    fn link(url: &str) -> LinkSelection {
        LinkSelection {
            id: 3,
            url: url.into(),
            anchor: "bike commuting basics".into(),
            keyword: "bike".into(),
            place: Place::in_section(Some("Section".into())),
        }
    }

    #[test]
    fn selection_requires_exactly_two_links() {
        let one = Selection::new(
            media("http://x/y.jpg", "Hero"),
            media("http://x/z.jpg", "Ctx"),
            vec![link("http://x/a")],
        );
        assert!(one.is_err());

        let three = Selection::new(
            media("http://x/y.jpg", "Hero"),
            media("http://x/z.jpg", "Ctx"),
            vec![link("http://x/a"), link("http://x/b"), link("http://x/c")],
        );
        assert!(three.unwrap_err().to_string().contains("got 3"));

        let two = Selection::new(
            media("http://x/y.jpg", "Hero"),
            media("http://x/z.jpg", "Ctx"),
            vec![link("http://x/a"), link("http://x/b")],
        )
        .expect("valid selection");
        assert_eq!(two.links().len(), 2);
        assert_eq!(
            two.urls(),
            vec!["http://x/y.jpg", "http://x/z.jpg", "http://x/a", "http://x/b"]
        );
    }

    #[test]
    fn alt_text_rules() {
        assert!(media("u", "A wind farm at dusk").validate_alt().is_ok());
        assert!(media("u", "").validate_alt().is_err());
        assert!(media("u", &"a".repeat(126)).validate_alt().is_err());
        assert!(media("u", &"a".repeat(125)).validate_alt().is_ok());
        assert!(media("u", "Image of a turbine").validate_alt().is_err());
        assert!(media("u", "  picture of a turbine").validate_alt().is_err());
    }

    #[test]
    fn selection_rejects_bad_alt() {
        let result = Selection::new(
            media("http://x/y.jpg", "Picture of a bike"),
            media("http://x/z.jpg", "Ctx"),
            vec![link("http://x/a"), link("http://x/b")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let json = r#"{
            "hero": {"id": 1, "type": "image", "url": "http://x/y.jpg", "alt": "Hero"},
            "context_item": {"id": 2, "type": "video", "url": "http://x/v.mp4", "alt": "Clip",
                             "place": {"section_heading": "Storage"}},
            "links": [
                {"id": 3, "url": "http://x/a", "anchor": "a", "keyword": "k",
                 "place": {"section_heading": "Storage", "paragraph_index": 0}}
            ]
        }"#;
        let err = serde_json::from_str::<Selection>(json).unwrap_err();
        assert!(err.to_string().contains("exactly two links"));
    }

    #[test]
    fn place_defaults_after_heading() {
        let place: Place = serde_json::from_str("{}").unwrap();
        assert!(place.after_heading);
        assert_eq!(place.paragraph_index, None);
    }

    #[test]
    fn qa_result_passed() {
        let accepted = QaResult {
            accepted: Some(true),
            rating: None,
            reasons: vec![],
            threshold: 7,
        };
        assert!(accepted.passed());

        let rated: QaResult = serde_json::from_str(r#"{"rating": 7}"#).unwrap();
        assert_eq!(rated.threshold, 7);
        assert!(rated.passed());

        let low: QaResult = serde_json::from_str(r#"{"accepted": false, "rating": 5}"#).unwrap();
        assert!(!low.passed());

        let empty: QaResult = serde_json::from_str("{}").unwrap();
        assert!(!empty.passed());
    }

    #[test]
    fn media_kind_from_asset_kind() {
        assert_eq!(MediaKind::try_from(AssetKind::Video).unwrap(), MediaKind::Video);
        assert!(MediaKind::try_from(AssetKind::Resource).is_err());
    }
}
