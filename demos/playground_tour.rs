//! Playground Tour
//!
//! Builds a playground over a throwaway definitions directory, connects to
//! the in-memory mock adapter, assigns a participant and tracks a metric.
//!
//! Run with: cargo run --example playground_tour

use std::sync::Arc;

use anyhow::Context as _;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use trueno_ab::adapter::MockAdapter;
use trueno_ab::config::ConfigFile;
use trueno_ab::context;
use trueno_ab::definition::Definition;
use trueno_ab::hooks::Request;
use trueno_ab::Playground;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Trueno-AB Playground Tour ===\n");

    let dir = std::env::temp_dir().join("trueno_ab_tour");
    std::fs::create_dir_all(dir.join("metrics"))?;
    std::fs::write(dir.join("metrics/signups.json"), r#"{"name": "Signups"}"#)?;
    std::fs::write(
        dir.join("button_color.json"),
        r#"{"name": "Button Color", "alternatives": ["red", "green"], "metrics": ["signups"]}"#,
    )?;

    // -------------------------------------------------------------------------
    // 1. Build and connect
    // -------------------------------------------------------------------------
    println!("1. Building playground...");

    let config = ConfigFile::from_value(json!({
        "development": {"adapter": "mock", "collecting": true},
        "metrics": {"revenue": "http://metrics.example.com/revenue"}
    }));
    let mock = Arc::new(MockAdapter::default());
    let playground = Arc::new(
        Playground::builder()
            .environment("development")
            .config_file(config)
            .load_path(&dir)
            .adapter(mock.clone())
            .autoconnect(true)
            .build()
            .context("building playground")?,
    );
    trueno_ab::set_playground(Some(Arc::clone(&playground)));

    let options = playground
        .connection_manager()
        .options()
        .context("playground should be connected")?;
    println!("   Connected: {} ({:?})", playground.is_connected(), options.adapter());

    // -------------------------------------------------------------------------
    // 2. Definitions
    // -------------------------------------------------------------------------
    println!("\n2. Loaded definitions...");

    for (id, experiment) in playground.experiments()? {
        println!("   Experiment {id}: {} alternatives", experiment.alternatives().len());
    }
    for (id, metric) in playground.metrics()? {
        println!("   Metric {id} (remote: {})", metric.url().unwrap_or("no"));
    }

    // -------------------------------------------------------------------------
    // 3. Participants and conversions
    // -------------------------------------------------------------------------
    println!("\n3. Recording a visit...");

    let visitor = Request::with_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/118.0");
    let crawler = Request::with_user_agent("Googlebot/2.1 (+http://www.google.com/bot.html)");
    println!("   Ignore crawler: {}", playground.ignores(Some(&crawler)));

    context::with_current(Arc::new(visitor.clone()), || -> anyhow::Result<()> {
        let request = context::current_as::<Request>().context("request context")?;
        if playground.ignores(Some(&*request)) {
            return Ok(());
        }
        let adapter = playground.connection()?;
        playground
            .experiment("button_color")?
            .add_participant(&*adapter, "visitor-42", 1)?;
        playground.track("signups", 1)?;
        Ok(())
    })?;

    for (experiment, alternative) in trueno_ab::playground()?.participant_info("visitor-42")? {
        println!("   {} -> {}", experiment.name(), alternative.value());
    }

    println!("   Mock participants: {}", mock.participant_count());

    playground.disconnect();
    println!("\n   Disconnected: {}", !playground.is_connected());
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

