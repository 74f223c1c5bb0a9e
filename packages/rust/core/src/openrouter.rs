//! OpenRouter-backed selector and quality reviewer.
//!
//! Both talk to the chat-completions endpoint and expect a bare JSON object
//! back. The selector never fails on upstream trouble: it logs and hands the
//! request to the deterministic [`FallbackSelector`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use mdenrich_markdown::section_paragraphs;
use mdenrich_shared::{
    CandidateAsset, EnrichError, LinkSelection, MediaKind, MediaSelection, OpenRouterConfig, Place,
    PromptMode, QaResult, Result, Selection,
};

use crate::fallback::FallbackSelector;
use crate::review::Reviewer;
use crate::selector::{SelectionOutcome, SelectionRequest, Selector};

/// USD per million prompt tokens used for cost estimates.
const PROMPT_PRICE_PER_M: f64 = 0.15;
/// USD per million completion tokens used for cost estimates.
const COMPLETION_PRICE_PER_M: f64 = 0.60;
/// Sections included in the paragraph view of the prompt.
const PROMPT_SECTIONS: usize = 6;

const SELECTOR_SYSTEM: &str =
    "You are a precise content selection assistant. Return only valid JSON per the provided schema.";
const REVIEWER_SYSTEM: &str = "You are a strict editorial reviewer. Return only a JSON object \
     with fields accepted (boolean), rating (integer 0-10) and reasons (array of strings).";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Token usage reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Estimated cost in USD.
    pub fn estimated_cost(&self) -> f64 {
        (self.prompt_tokens as f64 / 1_000_000.0) * PROMPT_PRICE_PER_M
            + (self.completion_tokens as f64 / 1_000_000.0) * COMPLETION_PRICE_PER_M
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Minimal chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f32,
    debug: bool,
}

impl OpenRouterClient {
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mdenrich/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnrichError::Network(format!("client build: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
            debug: config.debug,
        })
    }

    /// Send one system + user exchange and return the assistant content.
    pub async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: Option<f32>,
    ) -> Result<ChatResponse> {
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature.unwrap_or(self.temperature),
        });
        if self.debug {
            info!(body = %body, "openrouter request body");
        }

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::Network(format!("{url}: HTTP {status}")));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| EnrichError::parse(format!("completion body: {e}")))?;
        let usage = completion.usage.unwrap_or_default();
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| EnrichError::parse("completion has no content"))?;

        info!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            estimated_cost = usage.estimated_cost(),
            "openrouter usage"
        );
        if self.debug {
            info!(%content, "openrouter raw content");
        }
        Ok(ChatResponse { content, usage })
    }
}

/// Strip an optional Markdown code fence around a JSON reply.
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Upstream selector with deterministic fallback.
pub struct OpenRouterSelector {
    client: OpenRouterClient,
    fallback: FallbackSelector,
    prompt_mode: PromptMode,
    anchor_sanitize: bool,
}

impl OpenRouterSelector {
    pub fn new(client: OpenRouterClient, config: &OpenRouterConfig, fallback: FallbackSelector) -> Self {
        Self {
            client,
            fallback,
            prompt_mode: config.prompt_mode,
            anchor_sanitize: config.anchor_sanitize,
        }
    }

    async fn select_upstream(&self, request: &SelectionRequest<'_>) -> Result<SelectionOutcome> {
        let prompt = build_selection_prompt(request, self.prompt_mode);
        info!(model = request.model, prompt_mode = %self.prompt_mode, "requesting selection");
        let response = self
            .client
            .complete(request.model, SELECTOR_SYSTEM, &prompt.to_string(), None)
            .await?;
        let mut selection = parse_selection(&response.content)?;
        if self.anchor_sanitize {
            selection = sanitize_anchors(selection, request.keywords)?;
        }
        Ok(SelectionOutcome {
            selection,
            cost: response.usage.estimated_cost(),
        })
    }
}

#[async_trait]
impl Selector for OpenRouterSelector {
    #[instrument(skip_all, fields(model = request.model))]
    async fn select(&self, request: &SelectionRequest<'_>) -> Result<SelectionOutcome> {
        if request.offline {
            info!("selector offline; using fallback selection");
            return self.fallback.select(request).await;
        }
        match self.select_upstream(request).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "upstream selection failed");
                warn!("falling back to deterministic selection");
                self.fallback.select(request).await
            }
        }
    }
}

fn compact_asset(asset: &CandidateAsset) -> Value {
    json!({
        "id": asset.id,
        "type": asset.kind.as_str(),
        "url": asset.url,
        "title": asset.title,
        "description": asset.description,
        "tags": asset.tags,
        "resource_type": asset.resource_type,
    })
}

/// The JSON prompt sent to the selection model.
pub fn build_selection_prompt(request: &SelectionRequest<'_>, mode: PromptMode) -> Value {
    let bucket = request.bucket;
    let compact = |assets: &[CandidateAsset]| assets.iter().map(compact_asset).collect::<Vec<_>>();

    let mut payload = json!({
        "keywords": request.keywords,
        "brand_rules": request.brand_rules,
        "candidates": {
            "hero": compact(&bucket.hero),
            "context": compact(&bucket.context),
            "links": compact(&bucket.links),
        },
        "output_schema": {
            "hero": {"id": "int", "type": "image", "url": "str", "alt": "str"},
            "context_item": {"id": "int", "type": "image|video", "url": "str", "alt": "str",
                "place": {"section_heading": "str"}},
            "links": [{"id": "int", "url": "str", "anchor": "str", "keyword": "str",
                "place": {"section_heading": "str", "paragraph_index": "int", "sentence_index": "int"}}],
        },
        "constraints": [
            "Select exactly one hero image placed after the H1",
            "Select exactly one in-context item (image or video)",
            "Select exactly two links from the 'links' bucket; never reuse hero or context URLs as links",
            "Alt text must be descriptive and at most 125 characters; never start with 'Image of' or 'Picture of'",
            "Use only candidate URLs, unmodified",
            "Indices are zero-based; paragraphs are blank-line separated blocks of the target section; sentences split on '.', '!' or '?'",
            "Avoid repeating previous selections (URLs, anchors and locations)",
            "Return strictly valid JSON, no prose",
        ],
        "anchor_rules": [
            "The anchor must be a 2-6 word phrase copied verbatim from the target sentence",
            "Prefer a phrase containing or closely related to the assigned keyword",
            "Place the link inside the sentence, never appended after its final period",
            "Whole words only; keep possessives outside the anchor; never split numbers",
        ],
    });

    if let Some(previous) = request.previous {
        payload["previous_selection"] = json!({
            "hero": {"url": previous.hero().url, "alt": previous.hero().alt},
            "context": {
                "url": previous.context_item().url,
                "alt": previous.context_item().alt,
                "section": previous.context_item().place.section_heading,
            },
            "links": previous.links().iter().map(|l| json!({
                "url": l.url,
                "anchor": l.anchor,
                "keyword": l.keyword,
                "section": l.place.section_heading,
            })).collect::<Vec<_>>(),
        });
    }
    if !request.reject_reasons.is_empty() {
        payload["reject_reasons"] = json!(request.reject_reasons);
    }
    if !request.avoid_urls.is_empty() {
        payload["avoid_urls"] = json!(request.avoid_urls);
    }

    let sections = || {
        request
            .profile
            .sections
            .iter()
            .take(PROMPT_SECTIONS)
            .map(|s| json!({"heading": s.heading, "paragraphs": section_paragraphs(s)}))
            .collect::<Vec<_>>()
    };
    match mode {
        PromptMode::Paragraphs => {
            payload["article_sections"] = json!(sections());
        }
        PromptMode::Full => {
            payload["article_text"] = json!(request.article_text);
            payload["allowed_headings"] = json!(
                request
                    .profile
                    .sections
                    .iter()
                    .take(PROMPT_SECTIONS)
                    .map(|s| s.heading.clone())
                    .collect::<Vec<_>>()
            );
        }
        PromptMode::Both => {
            payload["article_text"] = json!(request.article_text);
            payload["article_sections"] = json!(sections());
        }
    }
    payload
}

// -- reply parsing ----------------------------------------------------------

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("id is not an integer")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

#[derive(Deserialize, Default)]
struct ReplyPlace {
    #[serde(default)]
    section_heading: Option<String>,
    #[serde(default)]
    paragraph_index: Option<usize>,
    #[serde(default)]
    sentence_index: Option<usize>,
}

#[derive(Deserialize)]
struct ReplyMedia {
    #[serde(deserialize_with = "lenient_id")]
    id: i64,
    #[serde(default, rename = "type")]
    kind: Option<MediaKind>,
    url: String,
    alt: String,
    #[serde(default)]
    place: ReplyPlace,
}

#[derive(Deserialize)]
struct ReplyLink {
    #[serde(deserialize_with = "lenient_id")]
    id: i64,
    url: String,
    anchor: String,
    keyword: String,
    #[serde(default)]
    place: ReplyPlace,
}

#[derive(Deserialize)]
struct ReplySelection {
    hero: ReplyMedia,
    context_item: ReplyMedia,
    links: Vec<ReplyLink>,
}

/// Parse a model reply into a [`Selection`]. Invariant violations are errors,
/// never repaired.
pub fn parse_selection(content: &str) -> Result<Selection> {
    let reply: ReplySelection = serde_json::from_str(strip_fence(content))
        .map_err(|e| EnrichError::parse(format!("selection reply: {e}")))?;

    let hero = MediaSelection {
        id: reply.hero.id,
        kind: reply.hero.kind.unwrap_or(MediaKind::Image),
        url: reply.hero.url,
        alt: reply.hero.alt,
        place: Place::default(),
    };
    let context_item = MediaSelection {
        id: reply.context_item.id,
        kind: reply.context_item.kind.unwrap_or(MediaKind::Image),
        url: reply.context_item.url,
        alt: reply.context_item.alt,
        place: Place::in_section(reply.context_item.place.section_heading),
    };
    let links = reply
        .links
        .into_iter()
        .map(|l| LinkSelection {
            id: l.id,
            url: l.url,
            anchor: l.anchor,
            keyword: l.keyword,
            place: Place {
                section_heading: l.place.section_heading,
                paragraph_index: l.place.paragraph_index,
                sentence_index: l.place.sentence_index,
                after_heading: true,
            },
        })
        .collect();
    Selection::new(hero, context_item, links)
}

/// Replace banned or empty anchors and append the keyword to anchors that
/// lack every keyword. Anchors already containing a keyword are kept.
pub fn sanitize_anchors(selection: Selection, keywords: &[String]) -> Result<Selection> {
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Ok(selection);
    }

    let mut sanitized = 0usize;
    let links: Vec<LinkSelection> = selection
        .links()
        .iter()
        .enumerate()
        .map(|(i, link)| {
            let anchor = link.anchor.trim();
            let lowered = anchor.to_lowercase();
            let keyword = match link.keyword.trim() {
                "" => keywords[i % keywords.len()],
                kw => kw,
            };
            let banned = anchor.is_empty() || lowered.contains("click here");
            let has_keyword = keywords
                .iter()
                .any(|k| lowered.contains(&k.to_lowercase()));

            let anchor = if banned {
                sanitized += 1;
                if keyword.chars().count() <= 40 {
                    format!("{keyword} overview")
                } else {
                    keyword.chars().take(60).collect()
                }
            } else if !has_keyword {
                sanitized += 1;
                format!("{anchor} ({keyword})")
            } else {
                anchor.to_string()
            };
            LinkSelection {
                anchor,
                keyword: keyword.to_string(),
                ..link.clone()
            }
        })
        .collect();

    if sanitized > 0 {
        info!(sanitized, "anchor sanitization applied");
    }
    selection.with_links(links)
}

// ---------------------------------------------------------------------------
// Reviewer
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReviewReply {
    #[serde(default)]
    accepted: Option<bool>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    reasons: Vec<String>,
}

/// Upstream quality reviewer.
pub struct OpenRouterReviewer {
    client: OpenRouterClient,
    model: String,
    threshold: u8,
}

impl OpenRouterReviewer {
    pub fn new(client: OpenRouterClient, model: impl Into<String>, threshold: u8) -> Self {
        Self {
            client,
            model: model.into(),
            threshold,
        }
    }
}

#[async_trait]
impl Reviewer for OpenRouterReviewer {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn review(
        &self,
        markdown: &str,
        selection: &Selection,
        keywords: &[String],
        brand_rules: &str,
    ) -> Result<QaResult> {
        let prompt = json!({
            "article": markdown,
            "selection": {
                "hero": {"url": selection.hero().url, "alt": selection.hero().alt, "type": selection.hero().kind},
                "context": {
                    "url": selection.context_item().url,
                    "alt": selection.context_item().alt,
                    "type": selection.context_item().kind,
                    "section": selection.context_item().place.section_heading,
                },
                "links": selection.links().iter().map(|l| json!({
                    "url": l.url,
                    "anchor": l.anchor,
                    "keyword": l.keyword,
                    "section": l.place.section_heading,
                })).collect::<Vec<_>>(),
            },
            "keywords": keywords,
            "brand_rules": brand_rules,
            "criteria": [
                "Exactly one hero image after the H1",
                "One in-context image or video placed under a relevant section",
                "Two contextual hyperlinks integrated inline with descriptive anchors including the provided keywords",
                "Alt text descriptive and at most 125 characters; no 'Image of' or 'Picture of'",
                "No em dashes in generated anchors",
            ],
        });

        let response = self
            .client
            .complete(&self.model, REVIEWER_SYSTEM, &prompt.to_string(), Some(0.0))
            .await
            .map_err(|e| EnrichError::Review(e.to_string()))?;
        let reply: ReviewReply = serde_json::from_str(strip_fence(&response.content))
            .map_err(|e| EnrichError::Review(format!("unparseable verdict: {e}")))?;

        let rating = match reply.rating {
            Some(r) if r.is_finite() => Some(r.round().clamp(0.0, 10.0) as u8),
            Some(_) => return Err(EnrichError::Review("rating is not a number".into())),
            None => None,
        };
        Ok(QaResult {
            accepted: reply.accepted,
            rating,
            reasons: reply.reasons,
            threshold: self.threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use mdenrich_shared::{AssetKind, CandidateBucket, Profile};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPLY: &str = r#"{
        "hero": {"id": 1, "type": "image", "url": "https://m/1.jpg", "alt": "Capture fans on a roof"},
        "context_item": {"id": "3", "type": "video", "url": "https://v/3", "alt": "Plant walkthrough",
            "place": {"section_heading": "Storage"}},
        "links": [
            {"id": 10, "url": "https://l/10", "anchor": "click here", "keyword": "storage",
             "place": {"section_heading": "Storage", "paragraph_index": 0, "sentence_index": 1}},
            {"id": 11, "url": "https://l/11", "anchor": "pore space", "keyword": "storage"}
        ]
    }"#;

    fn config(base_url: &str) -> OpenRouterConfig {
        OpenRouterConfig {
            base_url: base_url.to_string(),
            ..OpenRouterConfig::default()
        }
    }

    fn asset(id: i64, kind: AssetKind, url: &str) -> CandidateAsset {
        CandidateAsset {
            id,
            kind,
            url: url.into(),
            title: Some(format!("Storage asset {id}")),
            description: None,
            tags: vec![],
            resource_type: None,
        }
    }

    fn bucket() -> CandidateBucket {
        CandidateBucket {
            hero: vec![asset(1, AssetKind::Image, "https://m/1.jpg")],
            context: vec![asset(3, AssetKind::Video, "https://v/3")],
            links: vec![
                asset(10, AssetKind::Resource, "https://l/10"),
                asset(11, AssetKind::Resource, "https://l/11"),
            ],
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 1_000_000, "completion_tokens": 1_000_000, "total_tokens": 2_000_000}
        })
    }

    fn request<'a>(
        profile: &'a Profile,
        bucket: &'a CandidateBucket,
        keywords: &'a [String],
        avoid: &'a BTreeSet<String>,
        offline: bool,
    ) -> SelectionRequest<'a> {
        SelectionRequest {
            article_text: "# Storage\n\nRock pore space holds CO2.\n",
            profile,
            keywords,
            bucket,
            brand_rules: "",
            model: "openai/gpt-4o-mini",
            offline,
            previous: None,
            reject_reasons: &[],
            avoid_urls: avoid,
        }
    }

    #[test]
    fn strip_fence_variants() {
        assert_eq!(strip_fence("{}"), "{}");
        assert_eq!(strip_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn usage_cost_estimate() {
        let usage = Usage {
            prompt_tokens: 2_000_000,
            completion_tokens: 500_000,
            total_tokens: 2_500_000,
        };
        assert!((usage.estimated_cost() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn parse_selection_maps_places_and_lenient_ids() {
        let selection = parse_selection(REPLY).unwrap();
        assert_eq!(selection.context_item().id, 3);
        assert_eq!(selection.context_item().kind, MediaKind::Video);
        assert_eq!(
            selection.context_item().place.section_heading.as_deref(),
            Some("Storage")
        );
        assert_eq!(selection.links()[0].place.sentence_index, Some(1));
        assert!(selection.links()[1].place.section_heading.is_none());
    }

    #[test]
    fn parse_selection_rejects_wrong_link_count_and_bad_alt() {
        let one_link = r#"{"hero": {"id": 1, "url": "h", "alt": "Hero"},
            "context_item": {"id": 2, "url": "c", "alt": "Ctx"},
            "links": [{"id": 3, "url": "l", "anchor": "a", "keyword": "k"}]}"#;
        assert!(matches!(
            parse_selection(one_link),
            Err(EnrichError::Validation { .. })
        ));
        let bad_alt = REPLY.replace("Capture fans on a roof", "Image of fans");
        assert!(parse_selection(&bad_alt).is_err());
        assert!(matches!(
            parse_selection("not json"),
            Err(EnrichError::Parse { .. })
        ));
    }

    #[test]
    fn sanitize_replaces_banned_and_appends_keyword() {
        let selection = parse_selection(REPLY).unwrap();
        let keywords = vec!["storage".to_string()];
        let sanitized = sanitize_anchors(selection, &keywords).unwrap();
        assert_eq!(sanitized.links()[0].anchor, "storage overview");
        assert_eq!(sanitized.links()[1].anchor, "pore space (storage)");
    }

    #[test]
    fn prompt_modes_control_article_fields() {
        let profile = mdenrich_markdown::build_profile("# Storage\n\nRock pore space.\n");
        let bucket = bucket();
        let keywords = vec!["storage".to_string()];
        let avoid: BTreeSet<String> = ["https://l/9".to_string()].into();
        let req = request(&profile, &bucket, &keywords, &avoid, false);

        let both = build_selection_prompt(&req, PromptMode::Both);
        assert!(both.get("article_text").is_some());
        assert_eq!(both["article_sections"][0]["paragraphs"][0], "Rock pore space.");
        assert_eq!(both["avoid_urls"][0], "https://l/9");
        assert!(both.get("reject_reasons").is_none());

        let paragraphs = build_selection_prompt(&req, PromptMode::Paragraphs);
        assert!(paragraphs.get("article_text").is_none());

        let full = build_selection_prompt(&req, PromptMode::Full);
        assert!(full.get("article_sections").is_none());
        assert_eq!(full["allowed_headings"][0], "Storage");
    }

    #[tokio::test]
    async fn selector_uses_upstream_reply_and_reports_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPLY)))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let client = OpenRouterClient::new(&cfg, "test-key").unwrap();
        let selector = OpenRouterSelector::new(client, &cfg, FallbackSelector::new(vec![]));

        let profile = mdenrich_markdown::build_profile("# Storage\n\nRock pore space.\n");
        let bucket = bucket();
        let keywords = vec!["storage".to_string()];
        let avoid = BTreeSet::new();
        let outcome = selector
            .select(&request(&profile, &bucket, &keywords, &avoid, false))
            .await
            .unwrap();

        assert_eq!(outcome.selection.hero().alt, "Capture fans on a roof");
        // anchor_sanitize defaults on
        assert_eq!(outcome.selection.links()[0].anchor, "storage overview");
        assert!((outcome.cost - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn selector_falls_back_on_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let client = OpenRouterClient::new(&cfg, "k").unwrap();
        let selector = OpenRouterSelector::new(client, &cfg, FallbackSelector::new(vec![]));

        let profile = mdenrich_markdown::build_profile("# Storage\n\nRock pore space.\n");
        let bucket = bucket();
        let keywords = vec!["storage".to_string()];
        let avoid = BTreeSet::new();
        let outcome = selector
            .select(&request(&profile, &bucket, &keywords, &avoid, false))
            .await
            .unwrap();
        assert_eq!(outcome.cost, 0.0);
        assert_eq!(outcome.selection.links()[0].anchor, "storage asset 10");
    }

    #[tokio::test]
    async fn offline_selector_never_calls_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(REPLY)))
            .expect(0)
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let client = OpenRouterClient::new(&cfg, "k").unwrap();
        let selector = OpenRouterSelector::new(client, &cfg, FallbackSelector::new(vec![]));
        let profile = Profile::default();
        let bucket = bucket();
        let keywords = vec!["storage".to_string()];
        let avoid = BTreeSet::new();
        let outcome = selector
            .select(&request(&profile, &bucket, &keywords, &avoid, true))
            .await
            .unwrap();
        assert_eq!(outcome.selection.hero().url, "https://m/1.jpg");
    }

    #[tokio::test]
    async fn reviewer_parses_verdict_with_configured_threshold() {
        let server = MockServer::start().await;
        let verdict = r#"```json
{"accepted": false, "rating": 8, "reasons": ["anchors read naturally"]}
```"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(verdict)))
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let client = OpenRouterClient::new(&cfg, "k").unwrap();
        let reviewer = OpenRouterReviewer::new(client, "m", 9);
        let selection = parse_selection(REPLY).unwrap();
        let result = reviewer
            .review("# Doc", &selection, &["storage".into()], "")
            .await
            .unwrap();
        assert_eq!(result.rating, Some(8));
        assert_eq!(result.threshold, 9);
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn reviewer_errors_on_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("looks fine to me")))
            .mount(&server)
            .await;

        let cfg = config(&server.uri());
        let client = OpenRouterClient::new(&cfg, "k").unwrap();
        let reviewer = OpenRouterReviewer::new(client, "m", 7);
        let selection = parse_selection(REPLY).unwrap();
        let err = reviewer
            .review("# Doc", &selection, &[], "")
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichError::Review(_)));
    }
}
