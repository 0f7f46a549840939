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

//! Per-call profiling
//!
//! [`QueryProfiler`] is started on entry to an interception call, collects
//! the request shape and the final route, and turns into exactly one
//! [`OffloadEvent`] when stopped.
//!
//! ## Event format
//!
//! One JSON object per line:
//!
//! ```json
//! {"ts":"2026-01-05T10:00:00.000001+00:00","elapsed_us":412,"index_type":"FLAT",
//!  "nq":50,"dim":128,"topk":10,"decision":"accelerator","reason":"ok"}
//! ```

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::types::SearchRequest;

/// Path that produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    Accelerator,
    Cpu,
}

impl ExecutionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accelerator => "accelerator",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record per interception call. Never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffloadEvent {
    /// Wall-clock time the call finished (RFC 3339)
    pub ts: String,
    pub elapsed_us: u64,
    pub index_type: String,
    pub nq: usize,
    pub dim: usize,
    pub topk: usize,
    pub decision: ExecutionPath,
    pub reason: String,
}

impl OffloadEvent {
    /// Single-line JSON encoding
    pub fn to_json_line(&self) -> String {
        // Plain strings and integers only, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Scoped timer plus event builder.
#[derive(Debug)]
pub struct QueryProfiler {
    start: Instant,
    index_type: String,
    nq: usize,
    dim: usize,
    topk: usize,
    path: ExecutionPath,
    reason: String,
}

impl QueryProfiler {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            index_type: String::new(),
            nq: 0,
            dim: 0,
            topk: 0,
            path: ExecutionPath::Cpu,
            reason: String::new(),
        }
    }

    pub fn set_shape(&mut self, request: &SearchRequest<'_>) {
        self.index_type = request.index_kind.to_string();
        self.nq = request.n_queries;
        self.dim = request.dim;
        self.topk = request.top_k;
    }

    /// Record the final path; later calls overwrite earlier ones.
    pub fn set_route(&mut self, path: ExecutionPath, reason: impl Into<String>) {
        self.path = path;
        self.reason = reason.into();
    }

    pub fn path(&self) -> ExecutionPath {
        self.path
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Stop the timer and build the event.
    pub fn stop(self) -> OffloadEvent {
        let elapsed_us = self.elapsed_us();
        OffloadEvent {
            ts: chrono::Utc::now().to_rfc3339(),
            elapsed_us,
            index_type: self.index_type,
            nq: self.nq,
            dim: self.dim,
            topk: self.topk,
            decision: self.path,
            reason: self.reason,
        }
    }
}
