//! Candidate sources: where media and link records come from.

use async_trait::async_trait;
use mdenrich_shared::{CandidateAsset, Result};
use mdenrich_storage::Catalog;

/// Read-only provider of catalog records.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Images and videos.
    async fn media(&self) -> Result<Vec<CandidateAsset>>;
    /// Link resources.
    async fn links(&self) -> Result<Vec<CandidateAsset>>;
}

#[async_trait]
impl CandidateSource for Catalog {
    async fn media(&self) -> Result<Vec<CandidateAsset>> {
        Catalog::media(self).await
    }

    async fn links(&self) -> Result<Vec<CandidateAsset>> {
        Catalog::links(self).await
    }
}

/// In-memory source, used for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCandidates {
    pub media: Vec<CandidateAsset>,
    pub links: Vec<CandidateAsset>,
}

impl StaticCandidates {
    pub fn new(media: Vec<CandidateAsset>, links: Vec<CandidateAsset>) -> Self {
        Self { media, links }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn media(&self) -> Result<Vec<CandidateAsset>> {
        Ok(self.media.clone())
    }

    async fn links(&self) -> Result<Vec<CandidateAsset>> {
        Ok(self.links.clone())
    }
}
