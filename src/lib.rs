//! # Pagegist
//!
//! Webpage summarisation behind a daily free tier and a license gate.
//!
//! ## Features
//!
//! - **Readable text extraction**: content containers first, page chrome stripped
//! - **Model fallback**: an ordered list of Gemini models, with fatal errors short-circuiting
//! - **Usage gate**: a per-day counter for the free tier, bypassed by a verified license
//! - **Pluggable storage**: sled on disk, or in memory for tests

pub mod agent;
pub mod config;
pub mod gemini;
pub mod license;
pub mod pipeline;
pub mod scraper;
pub mod store;
pub mod summary;
pub mod usage;

pub use agent::SummaryClient;
pub use config::{Config, Settings};
pub use license::{HttpVerifier, LicenseManager, LicenseVerifier, StaticKeyVerifier};
pub use pipeline::{Outcome, Pipeline, PipelineError};
pub use store::{KvStore, MemoryStore, SledStore};
pub use summary::Summary;
pub use usage::{GateState, UsageGate};
