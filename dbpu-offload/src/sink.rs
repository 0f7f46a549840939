// SPDX-License-Identifier: AGPL-3.0-or-later
// DBPU Offload - Accelerator arbitration for vector search
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Event sinks
//!
//! Sinks receive one [`OffloadEvent`] per interception call. Writes are best
//! effort: a sink never reports failure to the caller.
//!
//! - [`JsonLinesSink`]: appends one JSON line per event to a file
//! - [`MemorySink`]: keeps events in memory, optionally bounded
//! - [`NullSink`]: discards everything

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::profiler::OffloadEvent;

/// Destination for instrumentation events.
pub trait EventSink: Send + Sync {
    /// Record one event. Must not panic or block on errors.
    fn emit(&self, event: &OffloadEvent);
}

/// Append-only JSON-lines file.
///
/// The file is opened per write, so it can be truncated or rotated
/// externally between calls. The mutex keeps lines from interleaving.
#[derive(Debug, Default)]
pub struct JsonLinesSink {
    path: Mutex<Option<PathBuf>>,
}

impl JsonLinesSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: Mutex::new(path),
        }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Some(path.into()))
    }

    /// Retarget the sink; `None` disables it.
    pub fn set_path(&self, path: Option<PathBuf>) {
        *self.path.lock() = path;
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    fn append(path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        // One write call per record.
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &OffloadEvent) {
        let guard = self.path.lock();
        let Some(path) = guard.as_deref() else {
            return;
        };
        let _ = Self::append(path, &event.to_json_line());
    }
}

/// In-memory sink.
///
/// [`new`](Self::new) keeps every event and is meant for tests. Long-lived
/// embedders should use [`bounded`](Self::bounded), which drops the oldest
/// event once full.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<VecDeque<OffloadEvent>>,
    capacity: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most the `capacity` most recent events.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Copy of everything retained so far, oldest first
    pub fn events(&self) -> Vec<OffloadEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn last(&self) -> Option<OffloadEvent> {
        self.events.lock().back().cloned()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &OffloadEvent) {
        let mut events = self.events.lock();
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return;
            }
            while events.len() >= capacity {
                events.pop_front();
            }
        }
        events.push_back(event.clone());
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &OffloadEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ExecutionPath;
    use std::sync::Arc;

    fn event(nq: usize) -> OffloadEvent {
        OffloadEvent {
            ts: "2026-01-05T10:00:00+00:00".into(),
            elapsed_us: 1,
            index_type: "FLAT".into(),
            nq,
            dim: 4,
            topk: 2,
            decision: ExecutionPath::Cpu,
            reason: "batch too small".into(),
        }
    }

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonLinesSink::to_file(&path);

        sink.emit(&event(1));
        sink.emit(&event(2));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["nq"], 2);
    }

    #[test]
    fn test_jsonl_unset_or_unwritable_is_silent() {
        let sink = JsonLinesSink::new(None);
        sink.emit(&event(1));

        let sink = JsonLinesSink::to_file("/nonexistent-dir/deeper/events.jsonl");
        sink.emit(&event(1));
        assert!(!Path::new("/nonexistent-dir/deeper/events.jsonl").exists());
    }

    #[test]
    fn test_jsonl_survives_external_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonLinesSink::to_file(&path);

        sink.emit(&event(1));
        std::fs::write(&path, "").unwrap();
        sink.emit(&event(2));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_jsonl_set_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");
        let sink = JsonLinesSink::to_file(&first);
        sink.emit(&event(1));
        sink.set_path(Some(second.clone()));
        sink.emit(&event(2));
        sink.set_path(None);
        sink.emit(&event(3));

        assert_eq!(std::fs::read_to_string(&first).unwrap().lines().count(), 1);
        assert_eq!(std::fs::read_to_string(&second).unwrap().lines().count(), 1);
        assert!(sink.path().is_none());
    }

    #[test]
    fn test_jsonl_concurrent_writers_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = Arc::new(JsonLinesSink::to_file(&path));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.emit(&event(t * 100 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["index_type"], "FLAT");
        }
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.emit(&event(7));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().nq, 7);
        NullSink.emit(&event(1));
    }

    #[test]
    fn test_bounded_memory_sink_keeps_latest() {
        let sink = MemorySink::bounded(3);
        for nq in 0..10 {
            sink.emit(&event(nq));
        }
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.capacity(), Some(3));
        let kept: Vec<usize> = sink.events().iter().map(|e| e.nq).collect();
        assert_eq!(kept, vec![7, 8, 9]);

        let sink = MemorySink::bounded(0);
        sink.emit(&event(1));
        assert!(sink.is_empty());
    }
}
