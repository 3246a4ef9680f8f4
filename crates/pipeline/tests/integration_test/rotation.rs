use std::io::Read;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::{stream, StreamExt};

use tickertape_core::{ManualClock, RotationPeriod, SinkConfig};
use tickertape_pipeline::{Aggregator, Pipeline};

use crate::helpers::{
    alloc, files_with_extension, job, late_evening, line_count, node, read_events, test_watch,
    wait_for_lines,
};

#[tokio::test]
async fn test_day_boundary_rotates_and_archives_previous_day() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("events");
    let config = SinkConfig::rotating(&dir, RotationPeriod::Daily).with_archive_dir(dir.join("archive"));
    let clock = ManualClock::new(late_evening());

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(&config, Arc::new(clock.clone()), Aggregator::from_watch(source))
        .await
        .unwrap();
    let running = tokio::spawn(pipeline.run());

    let day_one = dir.join("2025-06-14.log");
    let day_two = dir.join("2025-06-15.log");

    watch.allocations.send(alloc(1)).unwrap();
    wait_for_lines(&day_one, 1).await;

    clock.advance(Duration::minutes(20));
    watch.jobs.send(job(2)).unwrap();
    // The write that crosses the boundary lands in the new file.
    wait_for_lines(&day_two, 1).await;
    drop(watch);

    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.events_written, 2);
    assert_eq!(stats.rotations, 1);
    assert_eq!(stats.archived, 1);
    assert_eq!(stats.archive_failures, 0);

    assert_eq!(files_with_extension(&dir, "log"), vec!["2025-06-14.log", "2025-06-15.log"]);
    assert_eq!(line_count(&day_one), 1);
    assert_eq!(line_count(&day_two), 1);

    assert_eq!(files_with_extension(&dir.join("archive"), "zip"), vec!["2025-06-14.zip"]);
    let mut archive =
        zip::ZipArchive::new(std::fs::File::open(dir.join("archive").join("2025-06-14.zip")).unwrap())
            .unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    assert_eq!(entry.name(), "2025-06-14.log");
    let mut body = String::new();
    entry.read_to_string(&mut body).unwrap();
    assert_eq!(body, std::fs::read_to_string(&day_one).unwrap());
}

#[tokio::test]
async fn test_idle_days_produce_no_files() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    let config = SinkConfig::rotating(&dir, RotationPeriod::Daily);
    let clock = ManualClock::new(late_evening());

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(&config, Arc::new(clock.clone()), Aggregator::from_watch(source))
        .await
        .unwrap();
    let running = tokio::spawn(pipeline.run());

    watch.nodes.send(node(1)).unwrap();
    wait_for_lines(&dir.join("2025-06-14.log"), 1).await;

    clock.advance(Duration::days(3));
    watch.nodes.send(node(2)).unwrap();
    wait_for_lines(&dir.join("2025-06-17.log"), 1).await;
    drop(watch);

    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.rotations, 1);
    assert_eq!(files_with_extension(&dir, "log"), vec!["2025-06-14.log", "2025-06-17.log"]);
}

#[tokio::test]
async fn test_rotation_under_concurrent_producers_loses_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    let mut config = SinkConfig::rotating(&dir, RotationPeriod::Daily);
    config.sync_writes = false;
    let clock = ManualClock::new(late_evening());

    let slow = |n| async move {
        tokio::task::yield_now().await;
        n
    };
    let aggregator = Aggregator::new()
        .with_source("allocations", stream::iter(0..500).then(slow).map(alloc))
        .with_source("jobs", stream::iter(0..500).then(slow).map(job))
        .with_source("nodes", stream::iter(0..500).then(slow).map(node));

    let ticker = {
        let clock = clock.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(StdDuration::from_millis(2)).await;
                clock.advance(Duration::days(1));
            }
        })
    };

    let stats = Pipeline::start(&config, Arc::new(clock.clone()), aggregator)
        .await
        .unwrap()
        .run()
        .await
        .unwrap();
    ticker.await.unwrap();

    let files = files_with_extension(&dir, "log");
    assert_eq!(files.len() as u64, stats.rotations + 1);

    // Every line of every file decodes, and nothing is lost or duplicated.
    let total: usize = files.iter().map(|f| read_events(&dir.join(f)).len()).sum();
    assert_eq!(total, 1500);
    assert_eq!(stats.events_written, 1500);
}

#[tokio::test]
async fn test_startup_archives_leftover_rotated_files() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    std::fs::write(dir.join("2025-06-12.log"), "{}\n").unwrap();
    std::fs::write(dir.join("2025-06-13.log"), "{}\n").unwrap();

    let config = SinkConfig::rotating(&dir, RotationPeriod::Daily).with_archive_dir(dir.join("zips"));
    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(
        &config,
        Arc::new(ManualClock::new(late_evening())),
        Aggregator::from_watch(source),
    )
    .await
    .unwrap();
    drop(watch);

    let stats = pipeline.run().await.unwrap();
    assert_eq!(stats.events_written, 0);
    assert_eq!(stats.archived, 2);
    assert_eq!(
        files_with_extension(&dir.join("zips"), "zip"),
        vec!["2025-06-12.zip", "2025-06-13.zip"]
    );
    // The current day's file is left alone.
    assert!(!dir.join("zips").join("2025-06-14.zip").exists());
}
