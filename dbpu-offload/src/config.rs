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

//! Offload configuration
//!
//! Sources, lowest to highest precedence:
//!
//! 1. Built-in defaults
//! 2. JSON file named by `DBPU_CONFIG` (or passed to [`InterceptorConfig::from_json_file`])
//! 3. Environment overrides:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `DBPU_OFFLOAD_ENABLED` | `1`/`true` enables, `0`/`false` disables |
//! | `DBPU_SCAN_THRESHOLD` | scan-fraction threshold in percent |
//! | `DBPU_MIN_BATCH` | minimum query batch size |
//! | `DBPU_LOG_PATH` | event log path, empty disables it |
//! | `DBPU_RUNTIME_LIB` | extra runtime library, probed first |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{OffloadError, OffloadResult};
use crate::types::IndexKind;

/// Default event log destination
pub const DEFAULT_LOG_PATH: &str = "/tmp/dbpu-knowhere.jsonl";

/// Runtime library candidates, probed in order.
pub const DEFAULT_RUNTIME_CANDIDATES: &[&str] = &[
    "libdbpu-runtime.dylib",
    "libdbpu-runtime.so",
    "/usr/local/lib/libdbpu-runtime.dylib",
    "/usr/local/lib/libdbpu-runtime.so",
    "/opt/homebrew/lib/libdbpu-runtime.dylib",
];

/// Tunables for the offload decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Master switch
    pub enabled: bool,
    /// Minimum estimated scan fraction, in percent
    pub scan_threshold_pct: f64,
    /// Minimum number of queries in one batch
    pub min_batch_size: usize,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_threshold_pct: 70.0,
            min_batch_size: 10,
        }
    }
}

impl OffloadConfig {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn scan_threshold(mut self, pct: f64) -> Self {
        self.scan_threshold_pct = pct;
        self
    }

    pub fn min_batch_size(mut self, n: usize) -> Self {
        self.min_batch_size = n;
        self
    }

    /// Threshold must be a finite percentage.
    pub fn validate(&self) -> OffloadResult<()> {
        if !self.scan_threshold_pct.is_finite()
            || !(0.0..=100.0).contains(&self.scan_threshold_pct)
        {
            return Err(OffloadError::config(format!(
                "scan_threshold_pct must be within 0..=100, got {}",
                self.scan_threshold_pct
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(enabled) = env_flag("DBPU_OFFLOAD_ENABLED") {
            self.enabled = enabled;
        }
        if let Some(pct) = env_parse::<f64>("DBPU_SCAN_THRESHOLD") {
            self.scan_threshold_pct = pct;
        }
        if let Some(n) = env_parse::<usize>("DBPU_MIN_BATCH") {
            self.min_batch_size = n;
        }
    }
}

/// Everything the interceptor needs at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub offload: OffloadConfig,
    /// Event log destination; `None` disables event logging
    pub log_path: Option<PathBuf>,
    /// Runtime libraries to probe, first loadable wins
    pub runtime_candidates: Vec<PathBuf>,
    /// Per-kind scan-fraction overrides (percent), keyed by index tag
    pub scan_estimates: HashMap<IndexKind, f64>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            offload: OffloadConfig::default(),
            log_path: Some(PathBuf::from(DEFAULT_LOG_PATH)),
            runtime_candidates: DEFAULT_RUNTIME_CANDIDATES.iter().map(PathBuf::from).collect(),
            scan_estimates: HashMap::new(),
        }
    }
}

impl InterceptorConfig {
    /// Parse a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> OffloadResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| OffloadError::config(format!("{}: {}", path.display(), e)))?;
        config.offload.validate()?;
        Ok(config)
    }

    /// Defaults, then `DBPU_CONFIG` file, then environment overrides.
    ///
    /// An unreadable or invalid file is logged and ignored; the interceptor
    /// must come up on every host.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os("DBPU_CONFIG") {
            Some(path) => Self::from_json_file(&path).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring DBPU_CONFIG");
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        let mut offload = self.offload.clone();
        offload.apply_env();
        match offload.validate() {
            Ok(()) => self.offload = offload,
            Err(e) => warn!(error = %e, "ignoring offload overrides from environment"),
        }

        if let Ok(path) = std::env::var("DBPU_LOG_PATH") {
            self.log_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(lib) = std::env::var_os("DBPU_RUNTIME_LIB").filter(|v| !v.is_empty()) {
            self.runtime_candidates.insert(0, PathBuf::from(lib));
        }
    }
}

/// Candidate list used by the process-wide runtime.
pub fn runtime_candidates_from_env() -> Vec<PathBuf> {
    InterceptorConfig::from_env().runtime_candidates
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    let flag = parse_flag(&value);
    if flag.is_none() {
        warn!(name, value = %value, "unrecognized boolean, ignoring");
    }
    flag
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %value, "unparseable value, ignoring");
            None
        }
    }
}
