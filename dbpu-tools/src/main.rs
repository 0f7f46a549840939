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

//! DBPU Probe CLI
//!
//! Operator tool for checking the accelerator runtime on a host and for
//! inspecting offload decisions without running the host engine.
//!
//! ## Usage
//!
//! ```bash
//! # Is a runtime installed, and which devices does it report?
//! dbpu-probe probe
//!
//! # Run the tiny loader smoke search against a specific library
//! dbpu-probe smoke --lib /opt/dbpu/lib/libdbpu-runtime.so
//!
//! # Would a batch of 32 IVF_FLAT queries be offloaded?
//! dbpu-probe decide --index-type IVF_FLAT --nq 32 --json
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dbpu_offload::{
    AcceleratorRuntime, IndexKind, InterceptorConfig, OffloadDecider, RuntimeBinding,
    StaticScanEstimator,
};

/// DBPU Probe - accelerator runtime diagnostics
#[derive(Parser)]
#[command(name = "dbpu-probe")]
#[command(about = "Probe the DBPU runtime and inspect offload decisions")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (defaults to $DBPU_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report runtime availability and devices
    Probe {
        /// Runtime library to try before the default candidates
        #[arg(long)]
        lib: Option<PathBuf>,

        /// Print a JSON object instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a small L2 search on the accelerator
    Smoke {
        /// Runtime library to try before the default candidates
        #[arg(long)]
        lib: Option<PathBuf>,

        /// Fail when no runtime is available
        #[arg(long)]
        require: bool,
    },

    /// Evaluate the offload decision for one batch
    Decide {
        /// Index type tag (FLAT, IVF_FLAT, IVF_PQ, HNSW, ...)
        #[arg(short, long)]
        index_type: String,

        /// Number of queries in the batch
        #[arg(short, long)]
        nq: usize,

        /// Scan fraction estimate in percent (default: per index type)
        #[arg(short, long)]
        scan: Option<f64>,

        /// Override the scan threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Override the minimum batch size
        #[arg(long)]
        min_batch: Option<usize>,

        /// Evaluate with offload disabled
        #[arg(long)]
        disabled: bool,

        /// Print a JSON object instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Probe { lib, json } => probe(&config, lib, json),
        Commands::Smoke { lib, require } => smoke(&config, lib, require),
        Commands::Decide {
            index_type,
            nq,
            scan,
            threshold,
            min_batch,
            disabled,
            json,
        } => decide(
            &config,
            DecideArgs {
                index_type,
                nq,
                scan,
                threshold,
                min_batch,
                disabled,
                json,
            },
        ),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<InterceptorConfig> {
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading config file");
            InterceptorConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => InterceptorConfig::from_env(),
    };
    debug!(
        enabled = config.offload.enabled,
        threshold = config.offload.scan_threshold_pct,
        min_batch = config.offload.min_batch_size,
        log_path = ?config.log_path,
        "offload config"
    );
    Ok(config)
}

fn candidates(config: &InterceptorConfig, lib: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = config.runtime_candidates.clone();
    if let Some(lib) = lib {
        candidates.insert(0, lib);
    }
    candidates
}

// ============================================================================
// probe
// ============================================================================

fn probe(config: &InterceptorConfig, lib: Option<PathBuf>, json: bool) -> Result<()> {
    let candidates = candidates(config, lib);
    debug!(?candidates, "probing runtime candidates");
    let runtime = RuntimeBinding::probe(&candidates);

    if json {
        let report = serde_json::json!({
            "available": runtime.is_available(),
            "runtime": runtime.describe(),
            "devices": runtime.devices(),
            "candidates": candidates,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Runtime available: {}",
        if runtime.is_available() { "YES" } else { "NO" }
    );
    println!("  Runtime:    {}", runtime.describe());
    let devices = runtime.devices();
    if devices.is_empty() {
        println!("  Devices:    (not reported)");
    } else {
        for (i, device) in devices.iter().enumerate() {
            println!("  Device {}:   {:?}", i, device);
        }
    }
    println!("  Candidates:");
    for candidate in &candidates {
        println!("    {}", candidate.display());
    }
    Ok(())
}

// ============================================================================
// smoke
// ============================================================================

const SMOKE_NQ: usize = 2;
const SMOKE_NB: usize = 16;
const SMOKE_DIM: usize = 4;
const SMOKE_K: usize = 3;

fn smoke(config: &InterceptorConfig, lib: Option<PathBuf>, require: bool) -> Result<()> {
    println!("\n=== DBPU Runtime Smoke Test ===");

    let candidates = candidates(config, lib);
    debug!(?candidates, "probing runtime candidates");
    let runtime = RuntimeBinding::probe(&candidates);
    println!(
        "Runtime available: {}",
        if runtime.is_available() { "YES" } else { "NO" }
    );
    if !runtime.is_available() {
        if require {
            bail!("no DBPU runtime could be bound: {}", runtime.describe());
        }
        return Ok(());
    }

    let queries: [f32; SMOKE_NQ * SMOKE_DIM] = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    let database: Vec<f32> = (0..SMOKE_NB * SMOKE_DIM).map(|i| (i % 7) as f32).collect();

    let start = Instant::now();
    let result = runtime
        .search(&database, SMOKE_NB, &queries, SMOKE_NQ, SMOKE_DIM, SMOKE_K)
        .context("Smoke search failed")?;
    let elapsed = start.elapsed();
    info!(elapsed_us = elapsed.as_micros() as u64, hits = result.len(), "smoke search complete");

    println!("\nTop results:");
    for q in 0..SMOKE_NQ {
        let Some((distances, ids)) = result.query_hits(q, SMOKE_K) else {
            bail!("runtime returned {} hits, expected {}", result.len(), SMOKE_NQ * SMOKE_K);
        };
        println!(" query {}:", q);
        for (id, dist) in ids.iter().zip(distances) {
            println!("  idx={} dist={}", id, dist);
        }
    }
    println!("\nWall time: {:.1} us", elapsed.as_secs_f64() * 1e6);

    if let Some(perf) = runtime.last_perf() {
        println!("\nPerf:");
        println!(" compute_us={}", perf.compute_time_us);
        println!(" h2d_us={}", perf.memcpy_h2d_time_us);
        println!(" d2h_us={}", perf.memcpy_d2h_time_us);
        println!(" total_us={}", perf.total_time_us);
        println!(" gflops={}", perf.throughput_gflops);
    }
    Ok(())
}

// ============================================================================
// decide
// ============================================================================

struct DecideArgs {
    index_type: String,
    nq: usize,
    scan: Option<f64>,
    threshold: Option<f64>,
    min_batch: Option<usize>,
    disabled: bool,
    json: bool,
}

fn decide(config: &InterceptorConfig, args: DecideArgs) -> Result<()> {
    let mut offload = config.offload.clone();
    if let Some(threshold) = args.threshold {
        offload = offload.scan_threshold(threshold);
    }
    if let Some(min_batch) = args.min_batch {
        offload = offload.min_batch_size(min_batch);
    }
    if args.disabled {
        offload = offload.enabled(false);
    }
    offload.validate().context("Invalid offload settings")?;

    let kind = IndexKind::from(args.index_type.as_str());
    let scan_pct = args.scan.unwrap_or_else(|| {
        StaticScanEstimator::new()
            .with_overrides(config.scan_estimates.clone())
            .estimate_kind(&kind)
    });
    let decision = OffloadDecider::new(&offload).decide(&kind, args.nq, scan_pct);

    if args.json {
        let report = serde_json::json!({
            "index_type": kind,
            "nq": args.nq,
            "scan_pct": scan_pct,
            "config": offload,
            "offload": decision.should_offload,
            "reason": decision.reason.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Index type:     {}", kind);
    println!("Batch size:     {}", args.nq);
    println!("Scan estimate:  {:.1}%", scan_pct);
    println!(
        "Config:         enabled={} threshold={:.1}% min_batch={}",
        offload.enabled, offload.scan_threshold_pct, offload.min_batch_size
    );
    println!(
        "Decision:       {} ({})",
        if decision.should_offload { "accelerator" } else { "cpu" },
        decision.reason
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_decide() {
        let cli = Cli::try_parse_from([
            "dbpu-probe",
            "decide",
            "-i",
            "ivf_flat",
            "--nq",
            "32",
            "--threshold",
            "60",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Decide {
                index_type,
                nq,
                scan,
                threshold,
                json,
                disabled,
                ..
            } => {
                assert_eq!(index_type, "ivf_flat");
                assert_eq!(nq, 32);
                assert_eq!(scan, None);
                assert_eq!(threshold, Some(60.0));
                assert!(json);
                assert!(!disabled);
            }
            _ => panic!("expected decide"),
        }
    }

    #[test]
    fn test_decide_rejects_bad_threshold() {
        let args = DecideArgs {
            index_type: "FLAT".into(),
            nq: 32,
            scan: None,
            threshold: Some(150.0),
            min_batch: None,
            disabled: false,
            json: false,
        };
        assert!(decide(&InterceptorConfig::default(), args).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbpu.json");
        std::fs::write(&path, r#"{ "offload": { "min_batch_size": 3 }, "log_path": null }"#)
            .unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.offload.min_batch_size, 3);
        assert!(config.log_path.is_none());

        let missing = load_config(Some(dir.path().join("missing.json")));
        assert!(format!("{:#}", missing.unwrap_err()).contains("Failed to load config"));
    }

    #[test]
    fn test_lib_flag_is_probed_first() {
        let config = InterceptorConfig::default();
        let list = candidates(&config, Some(PathBuf::from("/opt/dbpu/libdbpu-runtime.so")));
        assert_eq!(list[0], PathBuf::from("/opt/dbpu/libdbpu-runtime.so"));
        assert_eq!(list.len(), config.runtime_candidates.len() + 1);
    }

    #[test]
    fn test_smoke_without_runtime_is_not_an_error() {
        let config = InterceptorConfig {
            runtime_candidates: vec![PathBuf::from("/nonexistent/libdbpu-runtime.so")],
            ..InterceptorConfig::default()
        };
        assert!(smoke(&config, None, false).is_ok());
        assert!(smoke(&config, None, true).is_err());
    }
}
