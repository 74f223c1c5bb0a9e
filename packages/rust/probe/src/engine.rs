//! Concurrent candidate availability probing.
//!
//! Each URL gets a HEAD and a small ranged GET issued together. Probes run on
//! spawned tasks bounded by a semaphore, each under its own timeout; errors and
//! timeouts count as "unavailable" and never fail the batch.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, RANGE, REFERER,
};
use reqwest::{Client, Response};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};
use url::Url;

use mdenrich_shared::{AppConfig, AssetKind, CandidateAsset, CandidateBucket, EnrichError, Result};

/// Browser-like User-Agent; several media hosts reject unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".webm", ".mov", ".m4v"];

// ---------------------------------------------------------------------------
// ProbeConfig
// ---------------------------------------------------------------------------

/// Runtime probe settings, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Maximum in-flight probes.
    pub concurrency: usize,
    /// Per-probe timeout.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            timeout: Duration::from_secs(2),
        }
    }
}

impl From<&AppConfig> for ProbeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.availability.concurrency,
            timeout: Duration::from_millis(config.availability.timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Prober
// ---------------------------------------------------------------------------

/// Availability checker for candidate URLs.
pub struct Prober {
    client: Client,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl Prober {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| EnrichError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            timeout: config.timeout,
        })
    }

    /// Drop unavailable candidates from every bucket.
    ///
    /// A bucket whose candidates are all unavailable is returned unfiltered.
    #[instrument(skip_all, fields(hero = bucket.hero.len(), context = bucket.context.len(), links = bucket.links.len()))]
    pub async fn filter_bucket(&self, bucket: CandidateBucket) -> CandidateBucket {
        let CandidateBucket {
            hero,
            context,
            links,
        } = bucket;

        let hero_ok = self.probe_all(&hero, |a| a.kind).await;
        let context_ok = self.probe_all(&context, |a| a.kind).await;
        let links_ok = self.probe_all(&links, |_| AssetKind::Resource).await;

        let (hero, removed_hero) = keep_available(hero, &hero_ok);
        let (context, removed_context) = keep_available(context, &context_ok);
        let (links, removed_links) = keep_available(links, &links_ok);

        info!(
            removed_hero,
            removed_context, removed_links, "availability filter applied"
        );

        CandidateBucket {
            hero,
            context,
            links,
        }
    }

    /// Probe every asset concurrently; results are in input order.
    pub async fn probe_all(
        &self,
        assets: &[CandidateAsset],
        expected: impl Fn(&CandidateAsset) -> AssetKind,
    ) -> Vec<bool> {
        let handles: Vec<_> = assets
            .iter()
            .map(|asset| {
                let client = self.client.clone();
                let sem = self.semaphore.clone();
                let url = asset.url.clone();
                let kind = expected(asset);
                let timeout = self.timeout;

                tokio::spawn(async move {
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return false;
                    };
                    match tokio::time::timeout(timeout, is_available(&client, &url, kind)).await {
                        Ok(available) => available,
                        Err(_) => {
                            debug!(%url, "probe timed out");
                            false
                        }
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap_or(false));
        }
        results
    }
}

/// Keep the available assets, or all of them when none is available.
fn keep_available(assets: Vec<CandidateAsset>, ok: &[bool]) -> (Vec<CandidateAsset>, usize) {
    let available: Vec<CandidateAsset> = assets
        .iter()
        .zip(ok)
        .filter(|(_, ok)| **ok)
        .map(|(a, _)| a.clone())
        .collect();
    let removed = assets.len() - available.len();
    if available.is_empty() {
        (assets, removed)
    } else {
        (available, removed)
    }
}

// ---------------------------------------------------------------------------
// Single probe
// ---------------------------------------------------------------------------

async fn is_available(client: &Client, url: &str, expected: AssetKind) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => return false,
    };
    let referer = parsed.origin().ascii_serialization();
    let guessed = guess_kind(&parsed);

    let head = client
        .head(parsed.as_str())
        .header(REFERER, referer.as_str())
        .send();
    let get = client
        .get(parsed.as_str())
        .header(REFERER, referer.as_str())
        .header(RANGE, "bytes=0-64")
        .send();
    let (head, get) = tokio::join!(head, get);

    let available = [head, get]
        .into_iter()
        .filter_map(|r| r.ok())
        .any(|resp| response_accepted(&resp, expected, guessed));
    debug!(%url, ?expected, available, "probed");
    available
}

fn response_accepted(resp: &Response, expected: AssetKind, guessed: AssetKind) -> bool {
    let status = resp.status();
    if status.is_success() {
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        content_type_accepted(content_type, expected)
    } else {
        matches!(status.as_u16(), 401 | 403) && guessed == expected
    }
}

/// Whether a Content-Type is acceptable for the expected asset kind.
pub fn content_type_accepted(content_type: &str, expected: AssetKind) -> bool {
    let prefixes: &[&str] = match expected {
        AssetKind::Image => &["image/", "application/octet-stream"],
        AssetKind::Video => &["video/", "text/html", "application/octet-stream"],
        AssetKind::Resource => &["text/html", "application/pdf", "application/json"],
    };
    let content_type = content_type.trim().to_lowercase();
    prefixes.iter().any(|p| content_type.starts_with(p))
}

/// Asset kind implied by the URL's file extension.
pub fn guess_kind(url: &Url) -> AssetKind {
    let path = url.path().to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        AssetKind::Image
    } else if VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        AssetKind::Video
    } else {
        AssetKind::Resource
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn asset(id: i64, kind: AssetKind, url: String) -> CandidateAsset {
        CandidateAsset {
            id,
            kind,
            url,
            title: None,
            description: None,
            tags: Vec::new(),
            resource_type: None,
        }
    }

    fn prober(timeout_ms: u64) -> Prober {
        Prober::new(&ProbeConfig {
            concurrency: 4,
            timeout: Duration::from_millis(timeout_ms),
        })
        .unwrap()
    }

    #[test]
    fn content_types() {
        assert!(content_type_accepted("image/jpeg", AssetKind::Image));
        assert!(content_type_accepted("Application/Octet-Stream", AssetKind::Image));
        assert!(!content_type_accepted("text/html; charset=utf-8", AssetKind::Image));
        assert!(content_type_accepted("text/html; charset=utf-8", AssetKind::Video));
        assert!(content_type_accepted("application/pdf", AssetKind::Resource));
        assert!(!content_type_accepted("", AssetKind::Resource));
    }

    #[test]
    fn kind_from_extension() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert_eq!(guess_kind(&url("https://x.org/a/B.JPG")), AssetKind::Image);
        assert_eq!(guess_kind(&url("https://x.org/clip.webm?t=3")), AssetKind::Video);
        assert_eq!(guess_kind(&url("https://x.org/report.pdf")), AssetKind::Resource);
        assert_eq!(guess_kind(&url("https://x.org/page")), AssetKind::Resource);
    }

    #[test]
    fn empty_availability_keeps_bucket() {
        let assets = vec![asset(1, AssetKind::Image, "http://x/1.jpg".into())];
        let (kept, removed) = keep_available(assets.clone(), &[false]);
        assert_eq!(kept, assets);
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn probe_statuses_and_types() {
        let server = MockServer::start().await;

        Mock::given(path("/ok.jpg"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "image/jpeg"))
            .mount(&server)
            .await;
        Mock::given(path("/html.jpg"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(path("/private.jpg"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(path("/private-page"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let uri = server.uri();
        let assets = vec![
            asset(1, AssetKind::Image, format!("{uri}/ok.jpg")),
            asset(2, AssetKind::Image, format!("{uri}/html.jpg")),
            asset(3, AssetKind::Image, format!("{uri}/private.jpg")),
            asset(4, AssetKind::Image, format!("{uri}/private-page")),
            asset(5, AssetKind::Image, format!("{uri}/missing.jpg")),
            asset(6, AssetKind::Image, "not a url".into()),
        ];

        let results = prober(2_000).probe_all(&assets, |a| a.kind).await;
        assert_eq!(results, vec![true, false, true, false, false, false]);
    }

    #[tokio::test]
    async fn slow_probe_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let assets = vec![asset(1, AssetKind::Image, format!("{}/slow.jpg", server.uri()))];
        let results = prober(100).probe_all(&assets, |a| a.kind).await;
        assert_eq!(results, vec![false]);
    }

    #[tokio::test]
    async fn filter_bucket_drops_unavailable_and_reverts_empty() {
        let server = MockServer::start().await;
        Mock::given(path("/hero.jpg"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "image/jpeg"))
            .mount(&server)
            .await;
        Mock::given(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "video/mp4"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let bucket = CandidateBucket {
            hero: vec![
                asset(1, AssetKind::Image, format!("{uri}/gone.jpg")),
                asset(2, AssetKind::Image, format!("{uri}/hero.jpg")),
            ],
            context: vec![asset(3, AssetKind::Video, format!("{uri}/clip.mp4"))],
            links: vec![
                asset(4, AssetKind::Resource, format!("{uri}/dead-1")),
                asset(5, AssetKind::Resource, format!("{uri}/dead-2")),
            ],
        };

        let filtered = prober(2_000).filter_bucket(bucket).await;
        assert_eq!(filtered.hero.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(filtered.context.len(), 1);
        // Every link failed, so the unfiltered list comes back.
        assert_eq!(filtered.links.iter().map(|a| a.id).collect::<Vec<_>>(), vec![4, 5]);
    }
}
