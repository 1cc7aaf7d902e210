// src/ingest/providers/static_source.rs
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{NewsError, Result};
use crate::ingest::types::{SearchRequest, SourceAdapter};
use crate::model::RawResult;

/// Fixed records, or a fixed failure. Counts how often it was asked.
pub struct StaticAdapter {
    name: &'static str,
    records: Vec<RawResult>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticAdapter {
    pub fn new(name: &'static str, records: Vec<RawResult>) -> Self {
        Self {
            name,
            records,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// An adapter whose every call is `SourceUnavailable`.
    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<RawResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NewsError::unavailable(self.name, "configured to fail"));
        }
        Ok(self.records.clone())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
