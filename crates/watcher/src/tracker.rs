//! Turning list snapshots into change events.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tickertape_core::TaskStateEvent;

fn str_field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// `ModifyIndex` of a list item, 0 when absent.
pub fn modify_index(item: &Value) -> u64 {
    item.get("ModifyIndex").and_then(Value::as_u64).unwrap_or(0)
}

/// Items changed after `since`, in listing order.
pub fn modified_since(items: Vec<Value>, since: u64) -> Vec<Value> {
    items.into_iter().filter(|item| modify_index(item) > since).collect()
}

/// Remembers the newest task event seen per (allocation, task).
#[derive(Debug, Default)]
pub struct TaskEventTracker {
    seen: HashMap<(String, String), i64>,
}

impl TaskEventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task events of `alloc` newer than any seen before, oldest first.
    pub fn observe(&mut self, alloc: &Value, wait_index: u64, now: DateTime<Utc>) -> Vec<TaskStateEvent> {
        let Some(states) = alloc.get("TaskStates").and_then(Value::as_object) else {
            return Vec::new();
        };
        let alloc_id = str_field(alloc, "ID");

        let mut out = Vec::new();
        for (task, state) in states {
            let key = (alloc_id.to_string(), task.clone());
            let last = self.seen.get(&key).copied().unwrap_or(i64::MIN);

            let mut newest = last;
            let events = state.get("Events").and_then(Value::as_array);
            for event in events.into_iter().flatten() {
                let time = event.get("Time").and_then(Value::as_i64).unwrap_or(0);
                if time <= last {
                    continue;
                }
                newest = newest.max(time);
                out.push(TaskStateEvent {
                    timestamp: now,
                    wait_index,
                    alloc_id: alloc_id.to_string(),
                    job_id: str_field(alloc, "JobID").to_string(),
                    node_id: str_field(alloc, "NodeID").to_string(),
                    task_group: str_field(alloc, "TaskGroup").to_string(),
                    task: task.clone(),
                    state: str_field(state, "State").to_string(),
                    task_event: event.clone(),
                });
            }
            if newest > last {
                self.seen.insert(key, newest);
            }
        }
        out
    }

    /// Forget allocations that no longer appear in a full listing.
    pub fn retain_allocs(&mut self, live: &HashSet<&str>) {
        self.seen.retain(|(alloc_id, _), _| live.contains(alloc_id.as_str()));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
