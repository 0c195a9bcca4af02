//! Failure paths: nothing may be left behind in staging or at the target.

mod common;

use std::sync::Arc;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use common::{read_entry, sources, FakeHostname, FakeRuntime, FakeStatus, Workspace};
use rs_flare::config::{FlareConfig, RedactionRule};
use rs_flare::{BundleRequest, FlareBuilder, FlareError};

#[tokio::test]
async fn test_fatal_collector_cleans_up() -> Result<()> {
    let ws = Workspace::new()?;
    let mut config = FlareConfig::default();
    config.fatal_collectors = vec!["status".to_string()];
    let builder = ws.builder(config, sources(FakeStatus::failing()))?;
    let request = ws.request();

    let err = builder.create_flare(&request).await.unwrap_err();

    assert!(matches!(err, FlareError::FatalCollection { .. }));
    assert_eq!(err.collector(), Some("status"));
    assert!(!request.archive_path.exists());
    assert!(ws.staging_is_empty()?);
    assert!(ws.output_is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_packaging_failure_cleans_up() -> Result<()> {
    let ws = Workspace::new()?;
    let builder = ws.builder(FlareConfig::default(), sources(FakeStatus::returning("ok\n")))?;
    let request = BundleRequest::new(ws.out.path().join("no/such/dir/flare.zip"));

    let err = builder.create_flare(&request).await.unwrap_err();

    assert!(matches!(err, FlareError::Packaging(_)));
    assert!(!request.archive_path.exists());
    assert!(ws.staging_is_empty()?);
    assert!(ws.output_is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_cleans_up() -> Result<()> {
    let ws = Workspace::new()?;
    let builder = ws.builder(FlareConfig::default(), sources(FakeStatus::slow(Duration::from_secs(20))))?;
    let request = ws.request();
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let err = builder.create_flare_with_cancel(&request, token).await.unwrap_err();

    assert!(matches!(err, FlareError::Cancelled));
    assert!(ws.staging_is_empty()?);
    assert!(ws.output_is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_before_start() -> Result<()> {
    let ws = Workspace::new()?;
    let builder = ws.builder(FlareConfig::default(), sources(FakeStatus::returning("ok\n")))?;
    let token = CancellationToken::new();
    token.cancel();

    let err = builder.create_flare_with_cancel(&ws.request(), token).await.unwrap_err();

    assert!(matches!(err, FlareError::Cancelled));
    assert!(ws.staging_is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_timeout_is_degraded_not_fatal() -> Result<()> {
    let ws = Workspace::new()?;
    let mut config = FlareConfig::default();
    config.collector_timeout_secs = 1;
    let builder = ws.builder(config, sources(FakeStatus::slow(Duration::from_secs(20))))?;

    let outcome = builder.create_flare(&ws.request()).await?;

    assert_eq!(outcome.degraded.len(), 1);
    assert!(outcome.degraded[0].timed_out);
    assert!(read_entry(&outcome.archive_path, "web-01/envvars.log").is_ok());
    Ok(())
}

#[tokio::test]
async fn test_timed_out_log_copy_leaves_no_staging() -> Result<()> {
    let ws = Workspace::new()?;
    let mut log = String::new();
    for i in 0..400_000 {
        writeln!(log, "{} INFO request served password=hunter2 user=bob path=/api/v1/check", i)?;
    }
    let main = ws.write_source("var/log/svc.log", &log)?;
    ws.write_source("var/log/svc.log.1", &log)?;

    let mut config = FlareConfig::default();
    config.collector_timeout_secs = 1;
    let builder = ws.builder(config, sources(FakeStatus::returning("ok\n")))?;

    let outcome = builder.create_flare(&ws.request().log_file(main)).await?;

    assert!(ws.staging_is_empty()?);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(ws.staging_is_empty()?, "a copy kept writing after the run returned");
    assert!(outcome.archive_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_hanging_runtime_check_is_bounded() -> Result<()> {
    let ws = Workspace::new()?;
    let mut config = FlareConfig::default();
    config.collector_timeout_secs = 1;
    let mut sources = sources(FakeStatus::returning("ok\n"));
    sources.runtime = Arc::new(FakeRuntime {
        hang: true,
        ..FakeRuntime::default()
    });
    let builder = ws.builder(config, sources)?;

    let started = Instant::now();
    let outcome = builder.create_flare(&ws.request()).await?;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!outcome.is_degraded());
    assert!(read_entry(&outcome.archive_path, "web-01/docker_ps.log").is_err());
    Ok(())
}

#[tokio::test]
async fn test_cancel_during_runtime_check_cleans_up() -> Result<()> {
    let ws = Workspace::new()?;
    let mut config = FlareConfig::default();
    config.collector_timeout_secs = 30;
    let mut sources = sources(FakeStatus::returning("ok\n"));
    sources.runtime = Arc::new(FakeRuntime {
        hang: true,
        ..FakeRuntime::default()
    });
    let builder = ws.builder(config, sources)?;
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let started = Instant::now();
    let err = builder.create_flare_with_cancel(&ws.request(), token).await.unwrap_err();

    assert!(matches!(err, FlareError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(ws.staging_is_empty()?);
    assert!(ws.output_is_empty()?);
    Ok(())
}

#[tokio::test]
async fn test_unknown_hostname_never_fails() -> Result<()> {
    let ws = Workspace::new()?;
    let mut sources = sources(FakeStatus::returning("ok\n"));
    sources.hostname = Arc::new(FakeHostname(None));
    let builder = ws.builder(FlareConfig::default(), sources)?;

    let outcome = builder.create_flare(&ws.request()).await?;

    assert_eq!(outcome.hostname, "unknown");
    assert_eq!(read_entry(&outcome.archive_path, "unknown/status.log")?, "ok\n");
    Ok(())
}

#[tokio::test]
async fn test_empty_hostname_falls_back() -> Result<()> {
    let ws = Workspace::new()?;
    let mut sources = sources(FakeStatus::returning("ok\n"));
    sources.hostname = Arc::new(FakeHostname(Some("  ".to_string())));
    let builder = ws.builder(FlareConfig::default(), sources)?;

    let outcome = builder.create_flare(&ws.request()).await?;
    assert_eq!(outcome.hostname, "unknown");
    Ok(())
}

#[test]
fn test_invalid_redaction_rule_rejected_up_front() {
    let mut config = FlareConfig::default();
    config.redaction_rules.push(RedactionRule {
        pattern: "[unterminated".to_string(),
        replacement: "x".to_string(),
    });

    let result = FlareBuilder::new(config, sources(FakeStatus::returning("ok\n")));
    assert!(matches!(result, Err(FlareError::RedactionConfig(_))));
}

#[tokio::test]
async fn test_missing_staging_parent_is_setup_error() -> Result<()> {
    let ws = Workspace::new()?;
    let builder = FlareBuilder::new(FlareConfig::default(), sources(FakeStatus::returning("ok\n")))?
        .staging_parent(ws.staging.path().join("does/not/exist"));
    let request = ws.request();

    let err = builder.create_flare(&request).await.unwrap_err();

    assert!(matches!(err, FlareError::Setup(_)));
    assert!(!request.archive_path.exists());
    Ok(())
}
