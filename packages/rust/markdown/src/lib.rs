//! Markdown article profiling and enrichment rendering.
//!
//! - [`build_profile`] splits an article into heading-delimited sections.
//! - [`render_enriched`] inserts hero/context media and splices links into
//!   the prose, trying a fixed order of anchor-locate strategies per link.

mod locate;
mod profile;
mod render;
pub mod text;

pub use profile::{build_profile, section_paragraphs};
pub use render::render_enriched;
