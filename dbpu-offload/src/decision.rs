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

//! Offload Decision Engine
//!
//! Pure rule evaluation, first match wins:
//!
//! 1. offloading disabled            -> reject, "disabled"
//! 2. batch below `min_batch_size`   -> reject, "batch too small"
//! 3. scan estimate below threshold  -> reject, "scan fraction below threshold"
//! 4. graph-based index kind         -> reject, "index kind unsupported"
//! 5. otherwise                      -> accept, "ok"
//!
//! The scan fraction comes from a [`ScanEstimator`]; the decider treats it
//! as an opaque percentage.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::config::OffloadConfig;
use crate::types::{IndexKind, SearchRequest};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecisionReason {
    Disabled,
    BatchTooSmall,
    ScanBelowThreshold,
    UnsupportedIndex,
    Ok,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::BatchTooSmall => "batch too small",
            Self::ScanBelowThreshold => "scan fraction below threshold",
            Self::UnsupportedIndex => "index kind unsupported",
            Self::Ok => "ok",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation. Lives only for one interception call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub should_offload: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn reject(reason: DecisionReason) -> Self {
        Self {
            should_offload: false,
            reason,
        }
    }

    fn accept() -> Self {
        Self {
            should_offload: true,
            reason: DecisionReason::Ok,
        }
    }
}

/// Stateless decider over an immutable config snapshot.
#[derive(Debug, Clone)]
pub struct OffloadDecider<'a> {
    config: &'a OffloadConfig,
}

impl<'a> OffloadDecider<'a> {
    pub fn new(config: &'a OffloadConfig) -> Self {
        Self { config }
    }

    /// Evaluate the rules for one request shape.
    pub fn decide(&self, index_kind: &IndexKind, batch_size: usize, scan_pct: f64) -> Decision {
        if !self.config.enabled {
            return Decision::reject(DecisionReason::Disabled);
        }
        if batch_size < self.config.min_batch_size {
            return Decision::reject(DecisionReason::BatchTooSmall);
        }
        // NaN estimates never clear the threshold.
        if scan_pct.is_nan() || scan_pct < self.config.scan_threshold_pct {
            return Decision::reject(DecisionReason::ScanBelowThreshold);
        }
        if index_kind.is_graph_based() {
            return Decision::reject(DecisionReason::UnsupportedIndex);
        }
        Decision::accept()
    }
}

// ============================================================================
// Scan Estimation
// ============================================================================

/// Estimates the percentage of the dataset a request will scan.
pub trait ScanEstimator: Send + Sync {
    fn estimate(&self, request: &SearchRequest<'_>) -> f64;
}

/// Fixed per-kind estimates, used until real runtime statistics exist.
///
/// Exhaustive scans are close to 100%, IVF with raw vectors still touches
/// most lists, everything else prunes heavily.
#[derive(Debug, Clone)]
pub struct StaticScanEstimator {
    overrides: HashMap<IndexKind, f64>,
    fallback_pct: f64,
}

impl Default for StaticScanEstimator {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            fallback_pct: 10.0,
        }
    }
}

impl StaticScanEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the estimate for individual kinds.
    pub fn with_overrides(mut self, overrides: HashMap<IndexKind, f64>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn estimate_kind(&self, kind: &IndexKind) -> f64 {
        if let Some(&pct) = self.overrides.get(kind) {
            return pct;
        }
        match kind {
            IndexKind::Flat => 95.0,
            IndexKind::IvfFlat => 80.0,
            _ => self.fallback_pct,
        }
    }
}

impl ScanEstimator for StaticScanEstimator {
    fn estimate(&self, request: &SearchRequest<'_>) -> f64 {
        self.estimate_kind(&request.index_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OffloadConfig {
        OffloadConfig::default()
            .enabled(true)
            .scan_threshold(70.0)
            .min_batch_size(10)
    }

    #[test]
    fn test_small_batch_rejected() {
        let cfg = config();
        let d = OffloadDecider::new(&cfg).decide(&IndexKind::Flat, 2, 95.0);
        assert!(!d.should_offload);
        assert_eq!(d.reason, DecisionReason::BatchTooSmall);
        assert_eq!(d.reason.to_string(), "batch too small");
    }

    #[test]
    fn test_flat_large_batch_accepted() {
        let cfg = config();
        let d = OffloadDecider::new(&cfg).decide(&IndexKind::Flat, 50, 95.0);
        assert!(d.should_offload);
        assert_eq!(d.reason, DecisionReason::Ok);
    }

    #[test]
    fn test_hnsw_rejected_for_any_estimate() {
        let cfg = config();
        let decider = OffloadDecider::new(&cfg);
        for pct in [70.0, 95.0, 100.0] {
            let d = decider.decide(&IndexKind::Hnsw, 50, pct);
            assert_eq!(d.reason, DecisionReason::UnsupportedIndex);
            assert!(!d.should_offload);
        }
    }

    #[test]
    fn test_rule_order() {
        // Disabled wins over everything else.
        let cfg = config().enabled(false);
        let d = OffloadDecider::new(&cfg).decide(&IndexKind::Hnsw, 1, 0.0);
        assert_eq!(d.reason, DecisionReason::Disabled);

        // Batch size is checked before the scan estimate.
        let cfg = config();
        let d = OffloadDecider::new(&cfg).decide(&IndexKind::Hnsw, 1, 0.0);
        assert_eq!(d.reason, DecisionReason::BatchTooSmall);

        // Scan estimate before index kind.
        let d = OffloadDecider::new(&cfg).decide(&IndexKind::Hnsw, 50, 10.0);
        assert_eq!(d.reason, DecisionReason::ScanBelowThreshold);
    }

    #[test]
    fn test_threshold_boundaries() {
        let cfg = config();
        let decider = OffloadDecider::new(&cfg);
        assert!(decider.decide(&IndexKind::Flat, 10, 70.0).should_offload);
        assert!(!decider.decide(&IndexKind::Flat, 9, 70.0).should_offload);
        assert!(!decider.decide(&IndexKind::Flat, 10, 69.99).should_offload);
        assert_eq!(
            decider.decide(&IndexKind::Flat, 10, f64::NAN).reason,
            DecisionReason::ScanBelowThreshold
        );
    }

    #[test]
    fn test_deterministic() {
        let cfg = config();
        let decider = OffloadDecider::new(&cfg);
        let first = decider.decide(&IndexKind::IvfFlat, 32, 80.0);
        for _ in 0..100 {
            assert_eq!(decider.decide(&IndexKind::IvfFlat, 32, 80.0), first);
        }
    }

    #[test]
    fn test_static_estimates() {
        let est = StaticScanEstimator::new();
        assert_eq!(est.estimate_kind(&IndexKind::Flat), 95.0);
        assert_eq!(est.estimate_kind(&IndexKind::IvfFlat), 80.0);
        assert_eq!(est.estimate_kind(&IndexKind::IvfPq), 10.0);
        assert_eq!(est.estimate_kind(&IndexKind::Hnsw), 10.0);
        assert_eq!(est.estimate_kind(&IndexKind::Other("SCANN".into())), 10.0);

        let est = StaticScanEstimator::new()
            .with_overrides(HashMap::from([(IndexKind::IvfPq, 90.0)]));
        assert_eq!(est.estimate_kind(&IndexKind::IvfPq), 90.0);

        let queries = [0.0f32; 4];
        let req = SearchRequest::new(&[], &queries, 4, 1, "IVF_FLAT");
        assert_eq!(est.estimate(&req), 80.0);
    }
}
