use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedSender};

use tickertape_core::{
    AllocationEvent, EvaluationEvent, Event, JobEvent, NodeEvent, TaskStateEvent, WatchSource,
};

/// Senders feeding the five streams of a [`WatchSource`].
pub struct TestWatch {
    pub allocations: UnboundedSender<AllocationEvent>,
    pub task_states: UnboundedSender<TaskStateEvent>,
    pub evaluations: UnboundedSender<EvaluationEvent>,
    pub jobs: UnboundedSender<JobEvent>,
    pub nodes: UnboundedSender<NodeEvent>,
}

pub fn test_watch() -> (TestWatch, WatchSource) {
    let (alloc_tx, alloc_rx) = mpsc::unbounded_channel();
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let (eval_tx, eval_rx) = mpsc::unbounded_channel();
    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let (node_tx, node_rx) = mpsc::unbounded_channel();
    let watch = TestWatch {
        allocations: alloc_tx,
        task_states: task_tx,
        evaluations: eval_tx,
        jobs: job_tx,
        nodes: node_tx,
    };
    let source = WatchSource::from_receivers(alloc_rx, task_rx, eval_rx, job_rx, node_rx);
    (watch, source)
}

/// 2025-06-14 23:50 UTC, ten minutes before a daily boundary.
pub fn late_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 14, 23, 50, 0).unwrap()
}

pub fn alloc(n: u64) -> AllocationEvent {
    AllocationEvent {
        timestamp: Utc::now(),
        wait_index: n,
        allocation: json!({"ID": format!("alloc-{n}"), "ClientStatus": "running"}),
    }
}

pub fn job(n: u64) -> JobEvent {
    JobEvent {
        timestamp: Utc::now(),
        wait_index: n,
        job: json!({"ID": format!("job-{n}"), "Status": "running"}),
    }
}

pub fn node(n: u64) -> NodeEvent {
    NodeEvent {
        timestamp: Utc::now(),
        wait_index: n,
        node: json!({"ID": format!("node-{n}"), "Status": "ready"}),
    }
}

pub fn read_events(path: &Path) -> Vec<Event> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a standalone record"))
        .collect()
}

pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Poll until `path` holds at least `n` lines. Panics after five seconds.
pub async fn wait_for_lines(path: &Path, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while line_count(path) < n {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {n} lines in {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Names of the files directly inside `dir` with the given extension, sorted.
pub fn files_with_extension(dir: &Path, ext: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(ext))
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
