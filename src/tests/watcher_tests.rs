//! Tests for directory polling and the two watcher loops

use crate::error::PipelineError;
use crate::tests::helpers::pipeline::{EK_SAMPLE, FakeDecoder, RecordingSink, test_config};
use crate::tests::helpers::unique_temp_dir;
use crate::transform::RecordTransformer;
use crate::watcher::{CleanedDataWatcher, DirectorySnapshot, RawDataWatcher, diff, poll_directory};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn snapshot(names: &[&str]) -> DirectorySnapshot {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_poll_lists_files_only() {
    let temp_dir = unique_temp_dir("poll_files");
    let dir = temp_dir.path();
    fs::write(dir.join("packets_1.pcapng"), b"x").unwrap();
    fs::write(dir.join("notes.txt"), b"x").unwrap();
    fs::create_dir(dir.join("archive")).unwrap();

    let snap = poll_directory(dir).await.unwrap();
    assert_eq!(snap.len(), 2);
    assert!(snap.contains("packets_1.pcapng"));
    assert!(snap.contains("notes.txt"));
    assert!(!snap.contains("archive"));
}

#[tokio::test]
async fn test_poll_missing_directory_is_unavailable() {
    let temp_dir = unique_temp_dir("poll_missing");
    let err = poll_directory(&temp_dir.path().join("nope")).await.unwrap_err();
    assert!(matches!(err, PipelineError::DirectoryUnavailable { .. }));

    let empty = poll_directory(temp_dir.path()).await.unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_diff_reports_only_new_names() {
    let previous = snapshot(&["a.pcapng", "b.pcapng"]);
    let current = snapshot(&["b.pcapng", "d.pcapng", "c.pcapng"]);
    assert_eq!(diff(&previous, &current), vec!["c.pcapng", "d.pcapng"]);
    assert!(diff(&current, &current).is_empty());
}

async fn raw_watcher(config: &crate::config::PipelineConfig, decoder: FakeDecoder) -> RawDataWatcher {
    let transformer =
        RecordTransformer::new(Box::new(decoder), config.paths.cleaned_dir.clone()).unwrap();
    RawDataWatcher::new(config, transformer).await.unwrap()
}

#[tokio::test]
async fn test_raw_watcher_skips_files_present_at_startup() {
    let temp_dir = unique_temp_dir("raw_seeded");
    let config = test_config(temp_dir.path());
    fs::write(config.paths.raw_dir.join("old.pcapng"), b"old").unwrap();

    let decoder = FakeDecoder::emitting(EK_SAMPLE);
    let mut watcher = raw_watcher(&config, decoder.clone()).await;

    let report = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert!(report.detected.is_empty());
    assert!(report.cleaned.is_empty());
    assert_eq!(decoder.calls(), 0);
}

#[tokio::test]
async fn test_raw_watcher_ignores_other_suffixes() {
    let temp_dir = unique_temp_dir("raw_suffix");
    let config = test_config(temp_dir.path());
    let mut watcher = raw_watcher(&config, FakeDecoder::emitting(EK_SAMPLE)).await;

    fs::write(config.paths.raw_dir.join("packets_1.json"), b"{}").unwrap();
    fs::write(config.paths.raw_dir.join("packets_1.pcapng.part"), b"x").unwrap();

    let report = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert!(report.detected.is_empty());
    assert_eq!(watcher.tracked_count(), 0);
}

#[tokio::test]
async fn test_raw_watcher_processes_new_capture() {
    let temp_dir = unique_temp_dir("raw_process");
    let config = test_config(temp_dir.path());
    let mut watcher = raw_watcher(&config, FakeDecoder::emitting(EK_SAMPLE)).await;

    fs::write(config.paths.raw_dir.join("packets_1.pcapng"), vec![7u8; 1024]).unwrap();

    let report = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.detected, vec!["packets_1.pcapng"]);
    assert_eq!(
        report.cleaned,
        vec![config.paths.cleaned_dir.join("cleaned_packets_0001.json")]
    );
    assert_eq!(watcher.tracked_count(), 0);
}

#[tokio::test]
async fn test_raw_watcher_survives_decode_failure() {
    let temp_dir = unique_temp_dir("raw_decode_fail");
    let config = test_config(temp_dir.path());
    let mut watcher = raw_watcher(&config, FakeDecoder::failing()).await;

    let raw = config.paths.raw_dir.join("packets_1.pcapng");
    fs::write(&raw, vec![7u8; 64]).unwrap();

    let report = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed, vec!["packets_1.pcapng"]);
    assert!(raw.exists());
    assert_eq!(fs::read_dir(&config.paths.cleaned_dir).unwrap().count(), 0);

    // Next cycle carries on normally
    let next = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert!(next.failed.is_empty());
}

#[tokio::test]
async fn test_raw_watcher_recovers_when_directory_returns() {
    let temp_dir = unique_temp_dir("raw_unavailable");
    let config = test_config(temp_dir.path());
    let mut watcher = raw_watcher(&config, FakeDecoder::emitting(EK_SAMPLE)).await;

    fs::remove_dir_all(&config.paths.raw_dir).unwrap();
    let err = watcher.poll_once(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::DirectoryUnavailable { .. }));

    fs::create_dir_all(&config.paths.raw_dir).unwrap();
    fs::write(config.paths.raw_dir.join("packets_2.pcapng"), b"pcap").unwrap();
    let report = watcher.poll_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.cleaned.len(), 1);
}

#[tokio::test]
async fn test_raw_watcher_run_stops_on_cancel() {
    let temp_dir = unique_temp_dir("raw_cancel");
    let config = test_config(temp_dir.path());
    let watcher = raw_watcher(&config, FakeDecoder::emitting(EK_SAMPLE)).await;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(watcher.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher should stop after cancellation")
        .unwrap();
}

#[tokio::test]
async fn test_cleaned_watcher_dispatches_new_files_once() {
    let temp_dir = unique_temp_dir("cleaned_new");
    let config = test_config(temp_dir.path());
    fs::write(config.paths.cleaned_dir.join("cleaned_packets_0001.json"), "old\n").unwrap();

    let sink = Arc::new(RecordingSink::default());
    let mut watcher = CleanedDataWatcher::new(&config, sink.clone()).await.unwrap();

    fs::write(config.paths.cleaned_dir.join("cleaned_packets_0002.json"), EK_SAMPLE).unwrap();
    fs::write(config.paths.cleaned_dir.join("cleaned_packets_0003.json.tmp"), "partial").unwrap();

    let report = watcher.poll_once().await.unwrap();
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(sink.sent_names(), vec!["cleaned_packets_0002.json"]);
    assert_eq!(sink.sent_bodies(), vec![EK_SAMPLE.as_bytes().to_vec()]);

    let again = watcher.poll_once().await.unwrap();
    assert!(again.dispatched.is_empty());
    assert_eq!(sink.sent_names().len(), 1);
    assert!(config.paths.cleaned_dir.join("cleaned_packets_0002.json").exists());
}

#[tokio::test]
async fn test_cleaned_watcher_replays_existing_when_enabled() {
    let temp_dir = unique_temp_dir("cleaned_replay");
    let mut config = test_config(temp_dir.path());
    config.ingest.replay_existing = true;
    fs::write(config.paths.cleaned_dir.join("cleaned_packets_0001.json"), "left over\n").unwrap();

    let sink = Arc::new(RecordingSink::default());
    let mut watcher = CleanedDataWatcher::new(&config, sink.clone()).await.unwrap();
    watcher.poll_once().await.unwrap();

    assert_eq!(sink.sent_names(), vec!["cleaned_packets_0001.json"]);
}

#[tokio::test]
async fn test_cleaned_watcher_keeps_failed_file_and_continues() {
    let temp_dir = unique_temp_dir("cleaned_fail");
    let config = test_config(temp_dir.path());
    let sink = Arc::new(RecordingSink::failing_for(&["cleaned_packets_0001.json"]));
    let mut watcher = CleanedDataWatcher::new(&config, sink.clone()).await.unwrap();

    let failed = config.paths.cleaned_dir.join("cleaned_packets_0001.json");
    fs::write(&failed, EK_SAMPLE).unwrap();
    let report = watcher.poll_once().await.unwrap();
    assert_eq!(report.failed, vec!["cleaned_packets_0001.json"]);
    assert!(failed.exists());

    fs::write(config.paths.cleaned_dir.join("cleaned_packets_0002.json"), EK_SAMPLE).unwrap();
    let report = watcher.poll_once().await.unwrap();
    assert!(report.failed.is_empty());
    // No retry of the failed file
    assert_eq!(sink.sent_names(), vec!["cleaned_packets_0002.json"]);
}

#[tokio::test]
async fn test_cleaned_watcher_can_delete_after_dispatch() {
    let temp_dir = unique_temp_dir("cleaned_delete");
    let mut config = test_config(temp_dir.path());
    config.ingest.delete_after_dispatch = true;

    let sink = Arc::new(RecordingSink::default());
    let mut watcher = CleanedDataWatcher::new(&config, sink.clone()).await.unwrap();

    let path = config.paths.cleaned_dir.join("cleaned_packets_0001.json");
    fs::write(&path, EK_SAMPLE).unwrap();
    watcher.poll_once().await.unwrap();

    assert_eq!(sink.sent_names().len(), 1);
    assert!(!path.exists());
}
