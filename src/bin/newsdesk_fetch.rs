//! Fetch one or more topics and print the articles as JSON.
//!
//! Usage: `newsdesk-fetch [--metrics] [TOPIC_KEY ...]` (no keys = every configured topic).

use newsdesk::{telemetry, NewsdeskConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let mut show_metrics = false;
    let mut keys = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--metrics" => show_metrics = true,
            _ => keys.push(arg),
        }
    }
    let prometheus = if show_metrics {
        Some(telemetry::install_prometheus()?)
    } else {
        None
    };

    let cfg = NewsdeskConfig::load_default()?;
    let pipeline = Pipeline::from_config(&cfg)?;
    if keys.is_empty() {
        keys = pipeline.topics().iter().map(|t| t.key.clone()).collect();
    }

    let mut out = serde_json::Map::new();
    for key in &keys {
        let articles = pipeline.fetch(key).await;
        out.insert(key.clone(), serde_json::to_value(&articles)?);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }
    Ok(())
}
