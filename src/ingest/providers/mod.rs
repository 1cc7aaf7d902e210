// src/ingest/providers/mod.rs
pub mod brave;
pub mod google_news;
pub mod static_source;

pub use brave::{BraveMode, BraveSearchAdapter};
pub use google_news::GoogleNewsRssAdapter;
pub use static_source::StaticAdapter;
