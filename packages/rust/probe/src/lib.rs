//! Candidate availability probing.
//!
//! This crate provides:
//! - [`Prober`]: bounded, concurrent HEAD/GET probing of candidate URLs
//! - [`ProbeConfig`]: concurrency and per-probe timeout settings

pub mod engine;

pub use engine::{ProbeConfig, Prober, content_type_accepted, guess_kind};
