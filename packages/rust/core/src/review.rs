//! Quality reviewer contract.

use async_trait::async_trait;
use mdenrich_shared::{QaResult, Result, Selection};

/// Judges a rendered document. A returned [`QaResult`] counts as accepted iff
/// [`QaResult::passed`]; an `Err` lets the orchestrator degrade to the
/// structural validator in auto mode.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        markdown: &str,
        selection: &Selection,
        keywords: &[String],
        brand_rules: &str,
    ) -> Result<QaResult>;
}
