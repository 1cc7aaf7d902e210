// src/lib.rs
//! Topic news pipeline: pull raw results from unreliable search backends,
//! coerce them into [`Article`]s through a language model (with a
//! deterministic fallback), and memoize per topic with race-safe invalidation.

pub mod ai_adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::cache::ArticleCache;
pub use crate::config::NewsdeskConfig;
pub use crate::error::NewsError;
pub use crate::ingest::types::{SearchRequest, SourceAdapter};
pub use crate::model::{Article, Query, RawResult};
pub use crate::normalize::{MissingTitlePolicy, ResultNormalizer};
pub use crate::pipeline::{Pipeline, PipelineBuilder};
