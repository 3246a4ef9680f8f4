use std::collections::HashMap;
use std::sync::Arc;

use futures::stream;
use tokio::sync::oneshot;

use tickertape_core::{Event, EventKind, ManualClock, SinkConfig, SystemClock};
use tickertape_pipeline::{Aggregator, Pipeline};

use crate::helpers::{alloc, job, late_evening, node, read_events, test_watch, wait_for_lines};

#[tokio::test]
async fn test_six_events_fixed_file_in_delivery_order() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("events.log");
    let config = SinkConfig::fixed(&path);

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(&config, Arc::new(SystemClock), Aggregator::from_watch(source))
        .await
        .unwrap();
    let running = tokio::spawn(pipeline.run());

    // One at a time so the delivery order is known.
    let mut expected = Vec::new();
    for (i, event) in [
        Event::Allocation(alloc(1)),
        Event::Job(job(2)),
        Event::Allocation(alloc(3)),
        Event::Node(node(4)),
        Event::Allocation(alloc(5)),
        Event::Node(node(6)),
    ]
    .into_iter()
    .enumerate()
    {
        match event.clone() {
            Event::Allocation(e) => watch.allocations.send(e).unwrap(),
            Event::Job(e) => watch.jobs.send(e).unwrap(),
            Event::Node(e) => watch.nodes.send(e).unwrap(),
            _ => unreachable!(),
        }
        expected.push(event);
        wait_for_lines(&path, i + 1).await;
    }
    drop(watch);

    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.events_written, 6);
    assert_eq!(stats.rotations, 0);
    assert_eq!(stats.per_kind[&EventKind::Allocation], 3);
    assert_eq!(stats.per_kind[&EventKind::Job], 1);
    assert_eq!(stats.per_kind[&EventKind::Node], 2);

    assert_eq!(read_events(&path), expected);
}

#[tokio::test]
async fn test_concurrent_sources_every_event_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("events.log");
    let mut config = SinkConfig::fixed(&path);
    config.sync_writes = false;

    let aggregator = Aggregator::new()
        .with_source("allocations", stream::iter((0..200).map(alloc)))
        .with_source("jobs", stream::iter((1000..1300).map(job)))
        .with_source("nodes", stream::iter((2000..2100).map(node)));
    let stats = Pipeline::start(&config, Arc::new(SystemClock), aggregator)
        .await
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(stats.events_written, 600);

    let mut per_source: HashMap<EventKind, Vec<u64>> = HashMap::new();
    for event in read_events(&path) {
        let index = match &event {
            Event::Allocation(e) => e.wait_index,
            Event::Job(e) => e.wait_index,
            Event::Node(e) => e.wait_index,
            other => panic!("unexpected event {other:?}"),
        };
        per_source.entry(event.kind()).or_default().push(index);
    }

    // Each source's events appear exactly once and in their own order.
    assert_eq!(per_source[&EventKind::Allocation], (0..200).collect::<Vec<_>>());
    assert_eq!(per_source[&EventKind::Job], (1000..1300).collect::<Vec<_>>());
    assert_eq!(per_source[&EventKind::Node], (2000..2100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_shutdown_closes_sink_with_events_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("events.log");
    let config = SinkConfig::fixed(&path);

    let (watch, source) = test_watch();
    let pipeline = Pipeline::start(
        &config,
        Arc::new(ManualClock::new(late_evening())),
        Aggregator::from_watch(source),
    )
    .await
    .unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(pipeline.run_until(async {
        stop_rx.await.ok();
    }));

    watch.jobs.send(job(1)).unwrap();
    watch.nodes.send(node(2)).unwrap();
    wait_for_lines(&path, 2).await;
    stop_tx.send(()).unwrap();

    // Sources are still open; the pipeline stops on the signal alone.
    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.events_written, 2);
    assert_eq!(read_events(&path).len(), 2);
    drop(watch);
}
