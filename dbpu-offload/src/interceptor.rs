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

//! Search interception
//!
//! Every call walks START -> DECIDE -> EXECUTE -> RECORD:
//!
//! ```text
//!   START    profiler started, request shape captured
//!   DECIDE   decider verdict  AND  runtime availability
//!              yes + available  -> accelerator
//!              yes + absent     -> cpu ("binding unavailable")
//!              no               -> cpu (decider's reason)
//!   EXECUTE  accelerator: on failure run the CPU fallback instead
//!            cpu: run the CPU fallback
//!   RECORD   exactly one event emitted, exactly one result returned
//! ```
//!
//! The CPU fallback is injected per call and is authoritative: its errors
//! reach the caller unchanged, accelerator errors never do.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{InterceptorConfig, OffloadConfig};
use crate::decision::{DecisionReason, OffloadDecider, ScanEstimator, StaticScanEstimator};
use crate::error::{OffloadError, OffloadResult};
use crate::profiler::{ExecutionPath, QueryProfiler};
use crate::runtime::{AcceleratorRuntime, RuntimeBinding, SYM_SEARCH};
use crate::sink::{EventSink, JsonLinesSink};
use crate::types::{SearchRequest, SearchResult};

/// Reason recorded for the path a call finally took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// Verdict of the decision engine
    Decided(DecisionReason),
    /// Decider accepted but no runtime is bound
    RuntimeUnavailable,
    /// Accelerator was attempted and failed
    AcceleratorFailed,
}

impl RouteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decided(reason) => reason.as_str(),
            Self::RuntimeUnavailable => "binding unavailable",
            Self::AcceleratorFailed => "accelerator failed, used cpu fallback",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the DECIDE state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Accelerator,
    Cpu(RouteReason),
}

/// Arbitrates each search between the accelerator and the CPU path.
pub struct SearchInterceptor {
    runtime: Arc<dyn AcceleratorRuntime>,
    sink: Arc<dyn EventSink>,
    estimator: Arc<dyn ScanEstimator>,
    config: RwLock<Arc<OffloadConfig>>,
}

impl SearchInterceptor {
    pub fn new(
        runtime: Arc<dyn AcceleratorRuntime>,
        sink: Arc<dyn EventSink>,
        config: OffloadConfig,
    ) -> Self {
        Self {
            runtime,
            sink,
            estimator: Arc::new(StaticScanEstimator::new()),
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// Probe the configured runtime candidates and log to the configured path.
    pub fn from_config(config: &InterceptorConfig) -> Self {
        let runtime = RuntimeBinding::probe(&config.runtime_candidates);
        Self::with_runtime(runtime, config)
    }

    /// Same as [`from_config`](Self::from_config) with an existing runtime.
    pub fn with_runtime(runtime: Arc<dyn AcceleratorRuntime>, config: &InterceptorConfig) -> Self {
        let sink = Arc::new(JsonLinesSink::new(config.log_path.clone()));
        let estimator =
            StaticScanEstimator::new().with_overrides(config.scan_estimates.clone());
        Self::new(runtime, sink, config.offload.clone()).with_estimator(Arc::new(estimator))
    }

    /// Replace the scan-fraction estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn ScanEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Current config snapshot
    pub fn offload_config(&self) -> Arc<OffloadConfig> {
        Arc::clone(&self.config.read())
    }

    /// Swap the config; calls already deciding keep their snapshot.
    pub fn reload_offload_config(&self, config: OffloadConfig) -> OffloadResult<()> {
        config.validate()?;
        *self.config.write() = Arc::new(config);
        Ok(())
    }

    pub fn is_accelerator_available(&self) -> bool {
        self.runtime.is_available()
    }

    pub fn runtime(&self) -> &Arc<dyn AcceleratorRuntime> {
        &self.runtime
    }

    /// Run one search on whichever path the rules select.
    ///
    /// Returns the CPU fallback's error unchanged if the fallback fails.
    pub fn intercept_search<F, E>(
        &self,
        request: &SearchRequest<'_>,
        cpu_fallback: F,
    ) -> Result<SearchResult, E>
    where
        F: FnOnce(&SearchRequest<'_>) -> Result<SearchResult, E>,
    {
        let mut profiler = QueryProfiler::start();
        profiler.set_shape(request);

        let outcome = match self.plan(request) {
            Plan::Accelerator => match self.run_accelerator(request) {
                Ok(result) => {
                    profiler.set_route(
                        ExecutionPath::Accelerator,
                        DecisionReason::Ok.as_str(),
                    );
                    Ok(result)
                }
                Err(e) => {
                    warn!(error = %e, index_type = %request.index_kind, "DBPU search failed, using CPU fallback");
                    profiler.set_route(ExecutionPath::Cpu, RouteReason::AcceleratorFailed.as_str());
                    cpu_fallback(request)
                }
            },
            Plan::Cpu(reason) => {
                profiler.set_route(ExecutionPath::Cpu, reason.as_str());
                cpu_fallback(request)
            }
        };

        let event = profiler.stop();
        self.sink.emit(&event);
        outcome
    }

    fn plan(&self, request: &SearchRequest<'_>) -> Plan {
        let config = self.offload_config();
        let scan_pct = self.estimator.estimate(request);
        let decision =
            OffloadDecider::new(&config).decide(&request.index_kind, request.n_queries, scan_pct);
        debug!(
            index_type = %request.index_kind,
            nq = request.n_queries,
            scan_pct,
            offload = decision.should_offload,
            reason = %decision.reason,
            "offload decision"
        );

        if !decision.should_offload {
            return Plan::Cpu(RouteReason::Decided(decision.reason));
        }
        if !self.runtime.is_available() {
            return Plan::Cpu(RouteReason::RuntimeUnavailable);
        }
        Plan::Accelerator
    }

    fn run_accelerator(&self, request: &SearchRequest<'_>) -> OffloadResult<SearchResult> {
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            self.runtime.search(
                request.vectors,
                request.n_vectors,
                request.queries,
                request.n_queries,
                request.dim,
                request.top_k,
            )
        }));
        let result = match attempt {
            Ok(result) => result?,
            Err(_) => return Err(OffloadError::Panicked { operation: SYM_SEARCH }),
        };

        let expected = request.expected_result_len();
        if !result.has_len(expected) {
            return Err(OffloadError::InvalidArgument(format!(
                "accelerator returned {} distances and {} ids, expected {}",
                result.distances.len(),
                result.ids.len(),
                expected
            )));
        }
        if let Some(perf) = self.runtime.last_perf() {
            debug!(
                compute_us = perf.compute_time_us,
                h2d_us = perf.memcpy_h2d_time_us,
                d2h_us = perf.memcpy_d2h_time_us,
                total_us = perf.total_time_us,
                gflops = perf.throughput_gflops,
                "DBPU search perf"
            );
        }
        Ok(result)
    }
}

impl fmt::Debug for SearchInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchInterceptor")
            .field("runtime", &self.runtime.describe())
            .field("config", &self.offload_config())
            .finish()
    }
}
