//! The server binary's hidden `worker` subcommand, driven the way the
//! server drives it. Every test here is serial: a script written by one
//! test must not be held open by a fork from another.
#![cfg(unix)]

mod common;

use serial_test::serial;
use speechd_cache::backends::Properties;
use speechd_cache::cache;
use speechd_cache::job::{Job, JobResult};
use speechd_cache::pool::{ProcessExecutor, WorkerPool};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("Speech.toml");
    let body = format!(
        "cache_dir = \"{}\"\n{}\n",
        dir.join("files").display(),
        extra
    );
    std::fs::write(&path, body).unwrap();
    path
}

fn worker_pool(config: &Path) -> WorkerPool {
    let executor = ProcessExecutor::new(
        PathBuf::from(env!("CARGO_BIN_EXE_speechd-cache")),
        vec![
            "--config".to_string(),
            config.to_string_lossy().into_owned(),
            "worker".to_string(),
        ],
    );
    WorkerPool::new(Arc::new(executor), 1, Duration::from_secs(30))
}

fn stand_in_pool(script: &str) -> WorkerPool {
    let executor = ProcessExecutor::new(
        PathBuf::from("sh"),
        vec!["-c".to_string(), script.to_string()],
    );
    WorkerPool::new(Arc::new(executor), 1, Duration::from_secs(30))
}

fn job(engine: &str, text: &str) -> Job {
    Job {
        engine: engine.to_string(),
        format: ".wav".to_string(),
        utterances: BTreeMap::from([("a".to_string(), text.to_string())]),
        properties: Properties::new(),
    }
}

#[tokio::test]
#[serial]
async fn test_worker_reports_unknown_engine() {
    let dir = tempfile::tempdir().unwrap();
    let pool = worker_pool(&write_config(dir.path(), ""));

    let result = pool.submit(job("festival", "hello")).await.unwrap();
    assert_eq!(result, JobResult::failure("unknown speech engine"));
}

#[tokio::test]
#[serial]
async fn test_worker_renders_into_fresh_cache_dir() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.wav");
    common::write_silence(&template).unwrap();

    // Same argument layout as espeak-ng: -s -p -v -w <out> --stdin
    let engine = dir.path().join("fake-espeak");
    write_script(
        &engine,
        &format!("cat >/dev/null\ncp '{}' \"$5\"", template.display()),
    );
    let config = write_config(
        dir.path(),
        &format!("espeak_binary = \"{}\"", engine.display()),
    );

    let result = worker_pool(&config).submit(job("espeak", "hello")).await.unwrap();
    assert!(result.success, "{:?}", result.description);

    let expected = cache::identity(
        &cache::content_hash("hello"),
        &cache::param_hash(
            "espeak",
            &["200".to_string(), "50".to_string(), "default".to_string()],
        ),
    );
    assert_eq!(result.result.unwrap()["a"], expected);
    assert_eq!(
        std::fs::read(dir.path().join("files").join(format!("{}.wav", expected))).unwrap(),
        std::fs::read(&template).unwrap()
    );
}

#[tokio::test]
#[serial]
async fn test_worker_exit_status_is_reported() {
    let result = stand_in_pool("cat >/dev/null; exit 3")
        .submit(job("espeak", "hello"))
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result
        .description
        .unwrap()
        .starts_with("worker failed: exited with"));
}

#[tokio::test]
#[serial]
async fn test_worker_garbage_output_is_reported() {
    let result = stand_in_pool("cat >/dev/null; echo not-json")
        .submit(job("espeak", "hello"))
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result
        .description
        .unwrap()
        .starts_with("worker failed: unreadable result"));
}

#[tokio::test]
#[serial]
async fn test_worker_closing_stdin_is_a_worker_failure() {
    // Larger than a pipe buffer, so the write is still pending when the
    // read end goes away.
    let text = "a".repeat(1 << 20);
    let result = stand_in_pool("exec 0<&-; sleep 1")
        .submit(job("espeak", &text))
        .await
        .unwrap();
    assert_eq!(
        result.description.as_deref().map(|d| d.starts_with("worker failed: could not send job")),
        Some(true),
        "{:?}",
        result.description
    );
}
