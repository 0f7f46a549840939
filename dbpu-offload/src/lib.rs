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

//! # DBPU Offload
//!
//! Per-query arbitration between a DBPU accelerator runtime and the host
//! engine's CPU search path. A correct result is returned whether or not the
//! accelerator is installed, and whether or not it fails.
//!
//! ## Architecture
//!
//! ```text
//!   host engine
//!       │  SearchRequest + cpu_fallback
//!       ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                  SearchInterceptor                        │
//! │   DECIDE ──► OffloadDecider (+ ScanEstimator)             │
//! │          └─► AcceleratorRuntime::is_available             │
//! │   EXECUTE ─► RuntimeBinding::search ──fail──► cpu_fallback│
//! │   RECORD ──► QueryProfiler ──► EventSink (JSON lines)     │
//! └───────────────────────────────────────────────────────────┘
//!       │  SearchResult (query-major)
//!       ▼
//!   host engine
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::convert::Infallible;
//! use dbpu_offload::{InterceptorConfig, SearchInterceptor, SearchRequest, SearchResult};
//!
//! let interceptor = SearchInterceptor::from_config(&InterceptorConfig::from_env());
//!
//! let database = vec![0.0f32; 1000 * 64];
//! let queries = vec![0.0f32; 32 * 64];
//! let request = SearchRequest::new(&database, &queries, 64, 10, "FLAT");
//!
//! let result = interceptor
//!     .intercept_search(&request, |req| {
//!         // host CPU search
//!         Ok::<_, Infallible>(SearchResult::zeroed(req.n_queries, req.top_k))
//!     })
//!     .unwrap();
//! assert_eq!(result.len(), 32 * 10);
//! ```

pub mod config;
pub mod decision;
pub mod error;
pub mod interceptor;
pub mod profiler;
pub mod runtime;
pub mod sink;
pub mod types;

pub use config::{DEFAULT_LOG_PATH, DEFAULT_RUNTIME_CANDIDATES, InterceptorConfig, OffloadConfig};
pub use decision::{Decision, DecisionReason, OffloadDecider, ScanEstimator, StaticScanEstimator};
pub use error::{DbpuStatus, OffloadError, OffloadResult};
pub use interceptor::{RouteReason, SearchInterceptor};
pub use profiler::{ExecutionPath, OffloadEvent, QueryProfiler};
pub use runtime::{
    AbsentRuntime, AcceleratorRuntime, DbpuMetric, DeviceKind, EntryPoints, PerfRecord,
    RuntimeBinding, global_runtime,
};
pub use sink::{EventSink, JsonLinesSink, MemorySink, NullSink};
pub use types::{IndexKind, SearchRequest, SearchResult};
