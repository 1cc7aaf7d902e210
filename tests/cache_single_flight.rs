// tests/cache_single_flight.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use newsdesk::ai_adapter::{GenerateFuture, Generator, MockGenerator};
use newsdesk::ingest::providers::StaticAdapter;
use newsdesk::{Article, ArticleCache, Pipeline, Query, RawResult};

fn art(title: &str) -> Article {
    Article::from_parts(Some(title), None, None, Some("2024.05.01"), None)
}

fn raw_records() -> Vec<RawResult> {
    vec![RawResult::new("static")
        .with("title", "raw headline")
        .with("url", "https://news.example/1")]
}

/// Answers call N after `delays[N]`, with `answers[N]`.
struct ScriptedGenerator {
    answers: Vec<&'static str>,
    delays: Vec<Duration>,
    calls: AtomicUsize,
}

impl Generator for ScriptedGenerator {
    fn generate<'a>(&'a self, _prompt: &'a str, _web_search: bool) -> GenerateFuture<'a> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delays[n]).await;
            Ok(self.answers[n].to_string())
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[test]
fn put_get_and_empty_put_semantics() {
    let cache = ArticleCache::new();
    cache.put("k", vec![art("a"), art("b")]);
    let got = cache.get("k").unwrap();
    assert_eq!(got, vec![art("a"), art("b")]);

    cache.put("k", vec![]);
    assert_eq!(cache.get("k").unwrap().len(), 2, "empty put must not clear");

    cache.invalidate("k");
    assert!(cache.get("k").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_fetches_after_invalidate_share_one_load() {
    let generator = Arc::new(
        MockGenerator::new(r#"[{"title":"shared","url":"https://news.example/1","date":"2024.05.20"}]"#)
            .with_delay(Duration::from_millis(100)),
    );
    let adapter = Arc::new(StaticAdapter::new("static", raw_records()));
    let pipeline = Arc::new(
        Pipeline::builder()
            .topic(Query::new("T", "Topic", "query"))
            .adapter(adapter.clone())
            .generator(generator.clone())
            .build(),
    );

    pipeline.cache().put("T", vec![art("old")]);
    pipeline.invalidate("T");
    assert!(pipeline.cached("T").is_none());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move { p.fetch("T").await }));
    }
    let mut results = Vec::new();
    for h in handles {
        results.push(h.await.unwrap());
    }

    assert_eq!(generator.calls(), 1, "exactly one normalization call");
    assert_eq!(adapter.calls(), 1, "exactly one adapter call");
    for r in &results {
        assert_eq!(r, &results[0]);
        assert_eq!(r[0].title, "shared");
    }
}

#[tokio::test(start_paused = true)]
async fn slow_superseded_fetch_does_not_clobber_refresh() {
    let generator = Arc::new(ScriptedGenerator {
        answers: vec![
            r#"[{"title":"from generation 1","date":"2024.05.01"}]"#,
            r#"[{"title":"from generation 2","date":"2024.05.02"}]"#,
        ],
        delays: vec![Duration::from_secs(5), Duration::from_millis(10)],
        calls: AtomicUsize::new(0),
    });
    let pipeline = Arc::new(
        Pipeline::builder()
            .topic(Query::new("T", "Topic", "query"))
            .adapter(Arc::new(StaticAdapter::new("static", raw_records())))
            .generator(generator.clone())
            .build(),
    );

    let p = pipeline.clone();
    let slow = tokio::spawn(async move { p.fetch("T").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fresh = pipeline.refresh("T").await;
    assert_eq!(fresh[0].title, "from generation 2");
    assert_eq!(pipeline.cache().generation("T"), Some(2));

    let stale = slow.await.unwrap();
    assert_eq!(stale[0].title, "from generation 1");

    let cached = pipeline.cached("T").unwrap();
    assert_eq!(cached[0].title, "from generation 2");
    assert_eq!(pipeline.cache().generation("T"), Some(2));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_leader_hands_over_to_a_waiter() {
    let cache = Arc::new(ArticleCache::new());

    let c1 = cache.clone();
    let leader = tokio::spawn(async move {
        c1.get_or_fetch("k", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            vec![art("never")]
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let c2 = cache.clone();
    let waiter = tokio::spawn(async move {
        c2.get_or_fetch("k", |generation| async move { vec![art(&format!("takeover {generation}"))] })
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    leader.abort();
    let out = waiter.await.unwrap();
    assert_eq!(out[0].title, "takeover 2");
    assert_eq!(cache.get("k").unwrap()[0].title, "takeover 2");
}

#[tokio::test]
async fn waiters_receive_the_leaders_result_even_when_empty() {
    let cache = Arc::new(ArticleCache::new());
    let loads = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let c = cache.clone();
        let loads = loads.clone();
        handles.push(tokio::spawn(async move {
            c.get_or_fetch("k", |_| async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Vec::new()
            })
            .await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().is_empty());
    }
    assert!(loads.load(Ordering::SeqCst) >= 1);
    assert!(cache.get("k").is_none(), "empty results are never cached");
}
