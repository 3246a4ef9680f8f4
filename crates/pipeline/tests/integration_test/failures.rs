use std::sync::Arc;

use chrono::Duration;

use tickertape_core::{ManualClock, RotationPeriod, SinkConfig, TickertapeError};
use tickertape_pipeline::{Aggregator, Pipeline};

use crate::helpers::{
    alloc, files_with_extension, job, late_evening, line_count, node, test_watch, wait_for_lines,
};

#[tokio::test]
async fn test_sink_failure_stops_pipeline_without_later_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    let config = SinkConfig::rotating(&dir, RotationPeriod::Daily);
    let clock = ManualClock::new(late_evening());

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(&config, Arc::new(clock.clone()), Aggregator::from_watch(source))
        .await
        .unwrap();
    let running = tokio::spawn(pipeline.run());

    watch.allocations.send(alloc(1)).unwrap();
    wait_for_lines(&dir.join("2025-06-14.log"), 1).await;

    // The next day's file cannot be opened: a directory is in the way.
    std::fs::create_dir(dir.join("2025-06-15.log")).unwrap();
    clock.advance(Duration::hours(1));
    watch.jobs.send(job(2)).unwrap();
    watch.nodes.send(node(3)).unwrap();

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, TickertapeError::Open { .. }), "unexpected error: {err}");

    assert_eq!(line_count(&dir.join("2025-06-14.log")), 1);
    assert!(dir.join("2025-06-15.log").is_dir());
    assert_eq!(files_with_extension(&dir, "log"), vec!["2025-06-14.log", "2025-06-15.log"]);
    drop(watch);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_write_failure_is_fatal() {
    let config = SinkConfig::fixed("/dev/full");
    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(
        &config,
        Arc::new(ManualClock::new(late_evening())),
        Aggregator::from_watch(source),
    )
    .await
    .unwrap();
    let running = tokio::spawn(pipeline.run());

    watch.jobs.send(job(1)).unwrap();
    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, TickertapeError::Write { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_unwritable_archive_dir_does_not_disturb_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("events");
    let blocked = tmp.path().join("archive");
    // A plain file where the archive directory should be.
    std::fs::write(&blocked, "not a directory").unwrap();

    let config = SinkConfig::rotating(&dir, RotationPeriod::Daily).with_archive_dir(&blocked);
    let clock = ManualClock::new(late_evening());

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(&config, Arc::new(clock.clone()), Aggregator::from_watch(source))
        .await
        .unwrap();
    let running = tokio::spawn(pipeline.run());

    watch.allocations.send(alloc(1)).unwrap();
    wait_for_lines(&dir.join("2025-06-14.log"), 1).await;

    clock.advance(Duration::days(1));
    for n in 2..=4 {
        watch.allocations.send(alloc(n)).unwrap();
    }
    wait_for_lines(&dir.join("2025-06-15.log"), 3).await;

    clock.advance(Duration::days(1));
    watch.jobs.send(job(5)).unwrap();
    wait_for_lines(&dir.join("2025-06-16.log"), 1).await;
    drop(watch);

    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.events_written, 5);
    assert_eq!(stats.rotations, 2);
    assert_eq!(stats.archived, 0);
    assert_eq!(stats.archive_failures, 2);

    assert_eq!(line_count(&dir.join("2025-06-14.log")), 1);
    assert_eq!(line_count(&dir.join("2025-06-15.log")), 3);
    assert_eq!(line_count(&dir.join("2025-06-16.log")), 1);
    assert_eq!(std::fs::read_to_string(&blocked).unwrap(), "not a directory");
}
