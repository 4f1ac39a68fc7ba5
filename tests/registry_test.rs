//! Definition registry tests: lazy loading, cycle guard, partial loads, threads

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use trueno_ab::definition::{Definition, Experiment, Metric};
use trueno_ab::registry::{FnLoader, LoadContext};
use trueno_ab::{Error, Playground};

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn playground_for(dir: &TempDir) -> Playground {
    Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .build()
        .unwrap()
}

// =============================================================================
// Built-in JSON format
// =============================================================================

#[test]
fn test_id_from_name_or_file_stem() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "whatever.json", r#"{"name": "Landing Page"}"#);
    write(dir.path(), "Free Shipping.json", r#"{"description": "unnamed"}"#);
    let playground = playground_for(&dir);

    let experiments = playground.experiments().unwrap();
    assert_eq!(
        experiments.keys().map(String::as_str).collect::<Vec<_>>(),
        ["free_shipping", "landing_page"]
    );
    assert_eq!(experiments["free_shipping"].description(), Some("unnamed"));
}

#[test]
fn test_default_alternatives() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "toggle.json", r#"{"name": "Toggle"}"#);
    let playground = playground_for(&dir);

    let experiment = playground.experiment("toggle").unwrap();
    let values: Vec<_> = experiment.alternatives().iter().map(|a| a.value().clone()).collect();
    assert_eq!(values, [json!(false), json!(true)]);
}

#[test]
fn test_array_file_defines_several() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "metrics/funnel.json",
        r#"[{"name": "Visits"}, {"name": "Add To Cart"}, {"name": "Checkout"}]"#,
    );
    let playground = playground_for(&dir);

    let metrics = playground.metrics().unwrap();
    assert_eq!(
        metrics.keys().map(String::as_str).collect::<Vec<_>>(),
        ["add_to_cart", "checkout", "visits"]
    );
}

#[test]
fn test_experiment_metric_reference_loads_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "metrics/clicks.json", r#"{"name": "Clicks"}"#);
    write(dir.path(), "banner.json", r#"{"name": "Banner", "metrics": ["clicks"]}"#);
    let playground = playground_for(&dir);

    assert!(!playground.metrics_loaded());
    let banner = playground.experiment("banner").unwrap();
    assert!(playground.metrics_loaded());
    assert_eq!(banner.metrics(), ["clicks".to_string()]);
}

#[test]
fn test_unknown_metric_reference_fails_with_path() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "banner.json", r#"{"name": "Banner", "metrics": ["ghost"]}"#);
    let playground = playground_for(&dir);

    let err = playground.experiments().unwrap_err();
    assert!(matches!(err, Error::Definition { .. }));
    let message = err.to_string();
    assert!(message.contains("banner.json"));
    assert!(message.contains("ghost"));
}

#[test]
fn test_missing_directory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path().join("does_not_exist"))
        .build()
        .unwrap();

    assert!(playground.experiments().unwrap().is_empty());
    assert!(playground.metrics().unwrap().is_empty());
}

// =============================================================================
// Loading policy
// =============================================================================

#[test]
fn test_partial_load_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a_first.json", r#"{"name": "A First"}"#);
    write(dir.path(), "b_broken.json", r#"{"name": "#);
    let playground = playground_for(&dir);

    let err = playground.experiments().unwrap_err();
    assert!(err.to_string().contains("b_broken.json"));
    assert!(playground.loading_guard().is_empty());

    let partial = playground.experiments().unwrap();
    assert_eq!(partial.keys().collect::<Vec<_>>(), ["a_first"]);

    write(dir.path(), "b_broken.json", r#"{"name": "B Fixed"}"#);
    assert_eq!(playground.experiments().unwrap().len(), 1);

    playground.reload().unwrap();
    assert_eq!(playground.experiments().unwrap().len(), 2);
}

#[test]
fn test_reentrant_read_sees_partial_map() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.exp", "");
    write(dir.path(), "b.exp", "");

    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let observed = Arc::clone(&seen);
    let loader = FnLoader::new("exp", move |ctx: &LoadContext<'_, Experiment>| {
        if ctx.file_id() == "b" {
            let visible = ctx.playground().experiments()?;
            observed.store(visible.len(), Ordering::SeqCst);
        }
        ctx.register(Experiment::new(ctx.file_id()));
        Ok(())
    });

    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .experiment_loader(Arc::new(loader))
        .build()
        .unwrap();

    assert_eq!(playground.experiments().unwrap().len(), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reload_from_inside_loader_loads_file_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "recursive.exp", "");

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader = FnLoader::new("exp", move |ctx: &LoadContext<'_, Experiment>| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert!(ctx.guard().contains(ctx.path()));
        ctx.playground().reload()?;
        ctx.register(Experiment::new("Recursive"));
        Ok(())
    });

    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .experiment_loader(Arc::new(loader))
        .build()
        .unwrap();

    playground.load().unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(playground.loading_guard().is_empty());
    assert_eq!(playground.experiment("recursive").unwrap().id(), "recursive");
}

#[test]
fn test_concurrent_reader_waits_for_first_load() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slow.exp", "");

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let loader = FnLoader::new("exp", move |ctx: &LoadContext<'_, Experiment>| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        ctx.register(Experiment::new("Slow"));
        Ok(())
    });

    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .experiment_loader(Arc::new(loader))
        .build()
        .unwrap();

    let (first, second) = std::thread::scope(|scope| {
        let first = scope.spawn(|| playground.experiment("slow").map(|e| e.id().to_string()));
        let second = scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(50));
            playground.experiment("slow").map(|e| e.id().to_string())
        });
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(first.unwrap(), "slow");
    assert_eq!(second.unwrap(), "slow");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_reader_waits_for_reload() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slow.exp", "");

    let loader = FnLoader::new("exp", |ctx: &LoadContext<'_, Experiment>| {
        std::thread::sleep(Duration::from_millis(200));
        ctx.register(Experiment::new("Slow"));
        Ok(())
    });

    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .experiment_loader(Arc::new(loader))
        .build()
        .unwrap();
    playground.load().unwrap();

    let during_reload = std::thread::scope(|scope| {
        let reload = scope.spawn(|| playground.reload());
        let reader = scope.spawn(|| {
            std::thread::sleep(Duration::from_millis(50));
            playground.experiments().map(|all| all.len())
        });
        reload.join().unwrap().unwrap();
        reader.join().unwrap()
    });

    assert_eq!(during_reload.unwrap(), 1);
}

#[test]
fn test_guard_released_after_loader_failure() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "metrics/bad.txt", "");

    let loader = FnLoader::new("txt", |ctx: &LoadContext<'_, Metric>| {
        assert!(!ctx.contains("bad"));
        Err(ctx.error("unsupported metric format"))
    });
    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .metric_loader(Arc::new(loader))
        .build()
        .unwrap();

    let err = playground.metric("bad").unwrap_err();
    assert!(err.to_string().contains("unsupported metric format"));
    assert!(playground.loading_guard().is_empty());
    assert!(playground.metrics_loaded());
}

#[test]
fn test_custom_loader_ids_are_used_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "metrics/remote.txt", "");

    let loader = FnLoader::new("txt", |ctx: &LoadContext<'_, Metric>| {
        ctx.register(Metric::remote("Mixed-Case", "http://example.com/m"));
        Ok(())
    });
    let playground = Playground::builder()
        .environment("test")
        .load_path(dir.path())
        .metric_loader(Arc::new(loader))
        .build()
        .unwrap();

    let metric = playground.metric("Mixed-Case").unwrap();
    assert_eq!(metric.id(), "Mixed-Case");
}
