// src/cache.rs
//! # ArticleCache
//! Per-topic memo of the last good article list, with single-flight loading
//! and generation-tagged writes.
//!
//! Generations come from one counter shared by all keys, so they only ever
//! grow for a key, across invalidations too. `invalidate` drops the key's
//! slot; a slot created later starts above every generation issued so far,
//! so a fetch that was already running can finish but cannot write its result.
//! Slots exist only while they hold an entry or a fetch is in flight.

use std::collections::HashMap;
use std::future::Future;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::model::Article;

struct Entry {
    generation: u64,
    articles: Vec<Article>,
}

struct InFlight {
    generation: u64,
    rx: watch::Receiver<Option<Vec<Article>>>,
}

struct Slot {
    entry: Option<Entry>,
    /// Generations at or below this are superseded.
    floor: u64,
    /// Last generation handed out for this slot.
    last_issued: u64,
    in_flight: Option<InFlight>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// Last generation handed out, any key.
    issued: u64,
}

impl Inner {
    /// Next generation for `key`, creating the slot if needed.
    fn issue(&mut self, key: &str) -> (u64, &mut Slot) {
        let floor = self.issued;
        self.issued += 1;
        let generation = self.issued;
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            entry: None,
            floor,
            last_issued: floor,
            in_flight: None,
        });
        slot.last_issued = generation;
        (generation, slot)
    }
}

#[derive(Default)]
pub struct ArticleCache {
    inner: Mutex<Inner>,
}

impl ArticleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<Article>> {
        let inner = self.inner.lock();
        inner.slots.get(key)?.entry.as_ref().map(|e| e.articles.clone())
    }

    /// Store under a fresh generation. Empty lists are ignored.
    pub fn put(&self, key: &str, articles: Vec<Article>) -> bool {
        let generation = self.begin_fetch(key);
        self.put_generation(key, generation, articles)
    }

    /// Store the result of fetch `generation`. Returns false, leaving the
    /// cache untouched, when the list is empty, the generation was superseded
    /// by an invalidation, or a newer generation is already stored.
    pub fn put_generation(&self, key: &str, generation: u64, articles: Vec<Article>) -> bool {
        if articles.is_empty() {
            tracing::debug!(key, generation, "not caching empty result");
            return false;
        }
        let mut inner = self.inner.lock();
        let accepted = match inner.slots.get_mut(key) {
            Some(slot) => {
                let newer_stored = slot
                    .entry
                    .as_ref()
                    .is_some_and(|e| e.generation >= generation);
                if generation <= slot.floor || newer_stored {
                    None
                } else {
                    Some(slot)
                }
            }
            // dropped by an invalidation after this generation was issued
            None => None,
        };
        match accepted {
            Some(slot) => {
                slot.entry = Some(Entry {
                    generation,
                    articles,
                });
                true
            }
            None => {
                tracing::info!(key, generation, "discarding stale cache write");
                counter!("newsdesk_stale_puts_total").increment(1);
                false
            }
        }
    }

    /// Hand out the next generation for `key`.
    pub fn begin_fetch(&self, key: &str) -> u64 {
        self.inner.lock().issue(key).0
    }

    /// Generation of the stored entry, if any.
    pub fn generation(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock();
        inner.slots.get(key)?.entry.as_ref().map(|e| e.generation)
    }

    /// Drop the entry and supersede any running fetch for `key`.
    pub fn invalidate(&self, key: &str) {
        self.inner.lock().slots.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.lock().slots.clear();
    }

    /// Number of keys holding an entry.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.values().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys holding an entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .slots
            .iter()
            .filter(|(_, s)| s.entry.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Keys with any bookkeeping at all (entry, fetch in flight, or an
    /// outstanding `begin_fetch`).
    pub fn tracked_keys(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Return the cached list, or run `loader` once for all concurrent callers.
    ///
    /// The first caller on a miss becomes the leader and runs
    /// `loader(generation)`; everyone arriving while it runs waits for the same
    /// result. If the leader is cancelled, a waiter takes over.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, loader: F) -> Vec<Article>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Vec<Article>>,
    {
        let (generation, tx) = loop {
            let mut rx = {
                let mut inner = self.inner.lock();
                if let Some(slot) = inner.slots.get(key) {
                    if let Some(e) = &slot.entry {
                        counter!("newsdesk_cache_hits_total").increment(1);
                        return e.articles.clone();
                    }
                }
                let joined = inner
                    .slots
                    .get(key)
                    .and_then(|s| s.in_flight.as_ref())
                    .map(|f| f.rx.clone());
                match joined {
                    Some(rx) => rx,
                    None => {
                        let (generation, slot) = inner.issue(key);
                        let (tx, rx) = watch::channel(None);
                        slot.in_flight = Some(InFlight { generation, rx });
                        break (generation, tx);
                    }
                }
            };

            counter!("newsdesk_fetch_coalesced_total").increment(1);
            tracing::debug!(key, "joining in-flight fetch");
            let shared = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
            match shared {
                Ok(articles) => return articles.unwrap_or_default(),
                // leader went away without answering
                Err(_) => continue,
            }
        };

        counter!("newsdesk_cache_misses_total").increment(1);
        let guard = LeaderGuard {
            cache: self,
            key,
            generation,
        };
        let articles = loader(generation).await;
        self.put_generation(key, generation, articles.clone());
        drop(guard);
        let _ = tx.send(Some(articles.clone()));
        articles
    }
}

/// Clears the in-flight marker when the leader finishes or is dropped,
/// unless an invalidation already replaced it. A slot left with nothing in
/// it is removed.
struct LeaderGuard<'a> {
    cache: &'a ArticleCache,
    key: &'a str,
    generation: u64,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock();
        let Some(slot) = inner.slots.get_mut(self.key) else {
            return;
        };
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == self.generation)
        {
            slot.in_flight = None;
        }
        let idle = slot.entry.is_none()
            && slot.in_flight.is_none()
            && slot.last_issued == self.generation;
        if idle {
            inner.slots.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(title: &str) -> Article {
        Article::from_parts(Some(title), None, None, Some("2024.05.01"), None)
    }

    #[test]
    fn put_then_get() {
        let c = ArticleCache::new();
        assert!(c.get("k").is_none());
        assert!(c.put("k", vec![art("a"), art("b")]));
        assert_eq!(c.get("k").unwrap().len(), 2);
        assert_eq!(c.keys(), vec!["k".to_string()]);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn empty_put_keeps_previous_entry() {
        let c = ArticleCache::new();
        c.put("k", vec![art("a")]);
        assert!(!c.put("k", vec![]));
        assert_eq!(c.get("k").unwrap()[0].title, "a");
    }

    #[test]
    fn older_generation_cannot_overwrite_newer() {
        let c = ArticleCache::new();
        let g1 = c.begin_fetch("k");
        let g2 = c.begin_fetch("k");
        assert!(g2 > g1);
        assert!(c.put_generation("k", g2, vec![art("new")]));
        assert!(!c.put_generation("k", g1, vec![art("old")]));
        assert_eq!(c.get("k").unwrap()[0].title, "new");
        assert_eq!(c.generation("k"), Some(g2));
    }

    #[test]
    fn invalidate_supersedes_issued_generations() {
        let c = ArticleCache::new();
        let g1 = c.begin_fetch("k");
        c.invalidate("k");
        assert!(!c.put_generation("k", g1, vec![art("late")]));
        assert!(c.get("k").is_none());
        let g2 = c.begin_fetch("k");
        assert!(g2 > g1);
        assert!(c.put_generation("k", g2, vec![art("fresh")]));
    }

    #[test]
    fn invalidate_all_clears_every_key() {
        let c = ArticleCache::new();
        c.put("a", vec![art("1")]);
        c.put("b", vec![art("2")]);
        c.invalidate_all();
        assert!(c.is_empty());
        assert!(c.keys().is_empty());
        assert_eq!(c.tracked_keys(), 0);
        // generations keep counting
        assert_eq!(c.begin_fetch("a"), 3);
    }

    #[test]
    fn generations_grow_across_keys_and_recreated_slots() {
        let c = ArticleCache::new();
        let a1 = c.begin_fetch("a");
        let b1 = c.begin_fetch("b");
        c.invalidate("a");
        let a2 = c.begin_fetch("a");
        assert!(a1 < b1 && b1 < a2);
        assert!(!c.put_generation("a", a1, vec![art("late")]));
        assert!(c.put_generation("b", b1, vec![art("b")]));
        assert!(c.put_generation("a", a2, vec![art("a")]));
    }

    #[tokio::test]
    async fn ad_hoc_keys_leave_no_slots_behind() {
        let c = ArticleCache::new();
        for i in 0..50 {
            let out = c.get_or_fetch(&format!("adhoc-{i}"), |_| async { Vec::new() }).await;
            assert!(out.is_empty());
        }
        assert_eq!(c.tracked_keys(), 0);

        for i in 0..50 {
            c.get_or_fetch(&format!("adhoc-{i}"), |_| async { vec![art("x")] }).await;
        }
        assert_eq!(c.tracked_keys(), 50);
        c.invalidate("adhoc-0");
        assert_eq!(c.tracked_keys(), 49);
        c.invalidate_all();
        assert_eq!(c.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn get_or_fetch_caches_non_empty_results_only() {
        let c = ArticleCache::new();
        let out = c.get_or_fetch("k", |_| async { Vec::new() }).await;
        assert!(out.is_empty());
        assert!(c.get("k").is_none());

        let out = c.get_or_fetch("k", |g| async move { vec![art(&format!("g{g}"))] }).await;
        assert_eq!(out[0].title, "g2");
        let again = c.get_or_fetch("k", |_| async { vec![art("unused")] }).await;
        assert_eq!(again, out);
    }
}
