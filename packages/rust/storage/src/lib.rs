//! libSQL storage for mdenrich.
//!
//! - [`Catalog`]: read access to the media (`images`, `videos`) and link
//!   (`resources`) databases the shortlister draws from.
//! - [`Journal`]: optional run journal recording each run and its step
//!   payloads, with schema migrations applied on open.

mod catalog;
mod journal;
mod migrations;

pub use catalog::{Catalog, split_tags};
pub use journal::{Journal, RunRecord, RunStatus, StepRecord, article_hash};
