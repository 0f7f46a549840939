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

//! DBPU Runtime Binding
//!
//! Binds the optional `libdbpu-runtime` shared library at runtime. The
//! library is probed from an ordered candidate list, its entry points are
//! resolved by symbol name and device 0 is initialized once.
//!
//! ## Variants
//!
//! - [`RuntimeBinding`]: library loaded, required symbols resolved, device
//!   initialized. Owns the device handle and the library handle.
//! - [`AbsentRuntime`]: null object reporting itself unavailable. Returned
//!   whenever probing fails, so callers never see binding errors.
//!
//! Both implement [`AcceleratorRuntime`]; the interceptor only talks to the
//! trait.
//!
//! ## ABI
//!
//! ```c
//! int           dbpu_get_devices(dbpu_device_type_t* out, int max);
//! dbpu_status_t dbpu_init_device(int index, dbpu_device_t* out);
//! void          dbpu_destroy_device(dbpu_device_t dev);
//! dbpu_status_t dbpu_search(dbpu_device_t dev,
//!                           const float* queries, const float* database,
//!                           int n_queries, int n_vectors, int dim, int top_k,
//!                           dbpu_metric_t metric,
//!                           float* distances, int64_t* ids);
//! dbpu_status_t dbpu_get_perf(dbpu_device_t dev, dbpu_perf_t* out);   // optional
//! ```

use std::os::raw::{c_float, c_int};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use libloading::Library;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::runtime_candidates_from_env;
use crate::error::{DbpuStatus, OffloadError, OffloadResult};
use crate::types::{SearchResult, check_buffer};

// ============================================================================
// ABI Types
// ============================================================================

pub const SYM_GET_DEVICES: &str = "dbpu_get_devices";
pub const SYM_INIT_DEVICE: &str = "dbpu_init_device";
pub const SYM_DESTROY_DEVICE: &str = "dbpu_destroy_device";
pub const SYM_SEARCH: &str = "dbpu_search";
pub const SYM_GET_PERF: &str = "dbpu_get_perf";

/// Upper bound on devices read back from `dbpu_get_devices`
const MAX_DEVICES: usize = 16;

/// Opaque device owned by the native runtime.
#[repr(C)]
pub struct DbpuDevice {
    _private: [u8; 0],
}

/// Distance metric understood by `dbpu_search`.
///
/// Must match `dbpu_metric_t` exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DbpuMetric {
    #[default]
    L2 = 0,
    InnerProduct = 1,
    Cosine = 2,
}

/// Performance record of the most recent native call (`dbpu_perf_t`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerfRecord {
    pub compute_time_us: u64,
    pub memcpy_h2d_time_us: u64,
    pub memcpy_d2h_time_us: u64,
    pub total_time_us: u64,
    pub throughput_gflops: f64,
}

/// Device families reported by `dbpu_get_devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Cpu,
    Simulator,
    Fpga,
    Asic,
    Unknown(i32),
}

impl DeviceKind {
    pub fn from_raw(code: c_int) -> Self {
        match code {
            0 => Self::Cpu,
            1 => Self::Simulator,
            2 => Self::Fpga,
            3 => Self::Asic,
            other => Self::Unknown(other),
        }
    }
}

pub type GetDevicesFn = unsafe extern "C" fn(out: *mut c_int, max: c_int) -> c_int;
pub type InitDeviceFn = unsafe extern "C" fn(index: c_int, out: *mut *mut DbpuDevice) -> c_int;
pub type DestroyDeviceFn = unsafe extern "C" fn(device: *mut DbpuDevice);
pub type SearchFn = unsafe extern "C" fn(
    device: *mut DbpuDevice,
    queries: *const c_float,
    database: *const c_float,
    n_queries: c_int,
    n_vectors: c_int,
    dim: c_int,
    top_k: c_int,
    metric: DbpuMetric,
    distances: *mut c_float,
    ids: *mut i64,
) -> c_int;
pub type GetPerfFn = unsafe extern "C" fn(device: *mut DbpuDevice, out: *mut PerfRecord) -> c_int;

/// Resolved entry points. `init_device` and `search` are required.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPoints {
    pub get_devices: Option<GetDevicesFn>,
    pub init_device: Option<InitDeviceFn>,
    pub destroy_device: Option<DestroyDeviceFn>,
    pub search: Option<SearchFn>,
    pub get_perf: Option<GetPerfFn>,
}

impl EntryPoints {
    /// Resolve every known symbol from `library`, leaving missing ones `None`.
    ///
    /// # Safety
    /// The library must export these symbols with the ABI documented at the
    /// top of this module, and must outlive the returned pointers.
    pub unsafe fn resolve(library: &Library) -> Self {
        unsafe {
            Self {
                get_devices: lookup(library, SYM_GET_DEVICES),
                init_device: lookup(library, SYM_INIT_DEVICE),
                destroy_device: lookup(library, SYM_DESTROY_DEVICE),
                search: lookup(library, SYM_SEARCH),
                get_perf: lookup(library, SYM_GET_PERF),
            }
        }
    }
}

unsafe fn lookup<T: Copy>(library: &Library, symbol: &'static str) -> Option<T> {
    match unsafe { library.get::<T>(symbol.as_bytes()) } {
        Ok(sym) => Some(*sym),
        Err(e) => {
            debug!(symbol, error = %e, "DBPU symbol not resolved");
            None
        }
    }
}

// ============================================================================
// Runtime Trait
// ============================================================================

/// Capability surface of an accelerator runtime.
pub trait AcceleratorRuntime: Send + Sync {
    /// Library, device and search entry point are all present
    fn is_available(&self) -> bool;

    /// Devices reported by the runtime (empty when unknown)
    fn devices(&self) -> Vec<DeviceKind>;

    /// L2 top-k search. Either returns `n_queries * top_k` hits or fails
    /// without producing anything.
    fn search(
        &self,
        database: &[f32],
        n_vectors: usize,
        queries: &[f32],
        n_queries: usize,
        dim: usize,
        top_k: usize,
    ) -> OffloadResult<SearchResult>;

    /// Performance record of the most recent call, if the runtime exports one
    fn last_perf(&self) -> Option<PerfRecord>;

    /// Short description for diagnostics
    fn describe(&self) -> String;
}

/// Null runtime used when no accelerator could be bound.
#[derive(Debug, Clone)]
pub struct AbsentRuntime {
    reason: String,
}

impl AbsentRuntime {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl AcceleratorRuntime for AbsentRuntime {
    fn is_available(&self) -> bool {
        false
    }

    fn devices(&self) -> Vec<DeviceKind> {
        Vec::new()
    }

    fn search(
        &self,
        _database: &[f32],
        _n_vectors: usize,
        _queries: &[f32],
        _n_queries: usize,
        _dim: usize,
        _top_k: usize,
    ) -> OffloadResult<SearchResult> {
        Err(OffloadError::RuntimeUnavailable)
    }

    fn last_perf(&self) -> Option<PerfRecord> {
        None
    }

    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }
}

// ============================================================================
// Bound Runtime
// ============================================================================

/// Where the entry points came from.
enum LibraryHandle {
    /// Opened with `dlopen`; closed when dropped
    Dynamic { library: Library, path: PathBuf },
    /// Linked into the process already (static simulator, tests)
    Linked,
}

/// A bound DBPU runtime: library handle, device 0 and resolved entry points.
///
/// Teardown destroys the device through the library's own
/// `dbpu_destroy_device` before the library is closed.
pub struct RuntimeBinding {
    device: Option<NonNull<DbpuDevice>>,
    entry: EntryPoints,
    // Dropped after `Drop::drop` has released the device.
    library: Option<LibraryHandle>,
}

// SAFETY: the device handle is only passed back to the runtime that created
// it; the runtime ABI is required to accept concurrent calls on one device.
unsafe impl Send for RuntimeBinding {}
unsafe impl Sync for RuntimeBinding {}

impl RuntimeBinding {
    /// Probe `candidates` in order and bind the first usable runtime.
    ///
    /// Never fails: any binding error yields an [`AbsentRuntime`].
    pub fn probe<P: AsRef<Path>>(candidates: &[P]) -> Arc<dyn AcceleratorRuntime> {
        match Self::load(candidates) {
            Ok(binding) => {
                info!(runtime = %binding.describe(), "DBPU runtime bound");
                Arc::new(binding)
            }
            Err(e) => {
                info!(reason = %e, "DBPU runtime not available, CPU path only");
                Arc::new(AbsentRuntime::new(e.to_string()))
            }
        }
    }

    /// Open the first loadable candidate and bind it.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> OffloadResult<Self> {
        let (library, path) = open_first(candidates)?;
        // SAFETY: the library stays alive inside the returned binding.
        let entry = unsafe { EntryPoints::resolve(&library) };
        Self::bind(entry, LibraryHandle::Dynamic { library, path })
    }

    /// Bind entry points that are already linked into the process.
    ///
    /// # Safety
    /// Every pointer must implement the ABI documented at the top of this
    /// module and stay valid for the lifetime of the binding.
    pub unsafe fn from_entry_points(entry: EntryPoints) -> OffloadResult<Self> {
        Self::bind(entry, LibraryHandle::Linked)
    }

    fn bind(entry: EntryPoints, library: LibraryHandle) -> OffloadResult<Self> {
        // An early return drops `library`, which closes it.
        let init = entry.init_device.ok_or(OffloadError::SymbolMissing {
            symbol: SYM_INIT_DEVICE,
        })?;
        if entry.search.is_none() {
            return Err(OffloadError::SymbolMissing { symbol: SYM_SEARCH });
        }
        if entry.get_perf.is_none() {
            debug!("dbpu_get_perf not exported, performance records disabled");
        }

        let mut raw: *mut DbpuDevice = std::ptr::null_mut();
        // SAFETY: valid out pointer, device index 0.
        let status = DbpuStatus::from_raw(unsafe { init(0, &mut raw) });
        if !status.is_success() {
            warn!(%status, "DBPU device initialization failed");
            return Err(OffloadError::DeviceInit { status });
        }
        let device = NonNull::new(raw).ok_or(OffloadError::DeviceInit {
            status: DbpuStatus::DeviceNotFound,
        })?;

        Ok(Self {
            device: Some(device),
            entry,
            library: Some(library),
        })
    }

    /// Path of the loaded library, `None` for linked entry points
    pub fn library_path(&self) -> Option<&Path> {
        match self.library.as_ref()? {
            LibraryHandle::Dynamic { path, .. } => Some(path),
            LibraryHandle::Linked => None,
        }
    }

    pub fn supports_perf(&self) -> bool {
        self.entry.get_perf.is_some()
    }
}

impl AcceleratorRuntime for RuntimeBinding {
    fn is_available(&self) -> bool {
        self.library.is_some() && self.device.is_some() && self.entry.search.is_some()
    }

    fn devices(&self) -> Vec<DeviceKind> {
        let Some(get_devices) = self.entry.get_devices else {
            return Vec::new();
        };
        let mut raw = [0 as c_int; MAX_DEVICES];
        // SAFETY: buffer holds MAX_DEVICES entries.
        let n = unsafe { get_devices(raw.as_mut_ptr(), MAX_DEVICES as c_int) };
        if n <= 0 {
            return Vec::new();
        }
        raw[..(n as usize).min(MAX_DEVICES)]
            .iter()
            .map(|&code| DeviceKind::from_raw(code))
            .collect()
    }

    fn search(
        &self,
        database: &[f32],
        n_vectors: usize,
        queries: &[f32],
        n_queries: usize,
        dim: usize,
        top_k: usize,
    ) -> OffloadResult<SearchResult> {
        if !self.is_available() {
            return Err(OffloadError::RuntimeUnavailable);
        }
        let (Some(device), Some(search)) = (self.device, self.entry.search) else {
            return Err(OffloadError::RuntimeUnavailable);
        };

        if dim == 0 {
            return Err(OffloadError::InvalidArgument(
                "dimension must be positive".into(),
            ));
        }
        check_buffer("database", database.len(), n_vectors, dim)?;
        check_buffer("queries", queries.len(), n_queries, dim)?;
        if n_queries == 0 || top_k == 0 {
            return Ok(SearchResult::default());
        }

        let nq = to_c_int("n_queries", n_queries)?;
        let nv = to_c_int("n_vectors", n_vectors)?;
        let d = to_c_int("dim", dim)?;
        let k = to_c_int("top_k", top_k)?;

        let mut out = SearchResult::zeroed(n_queries, top_k);
        // SAFETY: input buffers were length-checked above, output buffers
        // hold n_queries * top_k entries each.
        let raw = unsafe {
            search(
                device.as_ptr(),
                queries.as_ptr(),
                database.as_ptr(),
                nq,
                nv,
                d,
                k,
                DbpuMetric::L2,
                out.distances.as_mut_ptr(),
                out.ids.as_mut_ptr(),
            )
        };
        DbpuStatus::from_raw(raw)
            .check()
            .map_err(|status| OffloadError::native(SYM_SEARCH, status))?;
        Ok(out)
    }

    fn last_perf(&self) -> Option<PerfRecord> {
        if !self.is_available() {
            return None;
        }
        let get_perf = self.entry.get_perf?;
        let device = self.device?;
        let mut perf = PerfRecord::default();
        // SAFETY: valid device and out pointer.
        let status = DbpuStatus::from_raw(unsafe { get_perf(device.as_ptr(), &mut perf) });
        status.is_success().then_some(perf)
    }

    fn describe(&self) -> String {
        match self.library_path() {
            Some(path) => format!("dbpu runtime ({})", path.display()),
            None => "dbpu runtime (linked)".to_string(),
        }
    }
}

impl Drop for RuntimeBinding {
    fn drop(&mut self) {
        if let (Some(device), Some(destroy)) = (self.device.take(), self.entry.destroy_device) {
            // SAFETY: device came from this runtime's init entry point and is
            // released exactly once.
            unsafe { destroy(device.as_ptr()) };
            debug!("DBPU device released");
        }
    }
}

impl std::fmt::Debug for RuntimeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBinding")
            .field("library", &self.library_path())
            .field("device", &self.device)
            .field("perf", &self.supports_perf())
            .finish()
    }
}

fn open_first<P: AsRef<Path>>(candidates: &[P]) -> OffloadResult<(Library, PathBuf)> {
    let mut last_error = None;
    for candidate in candidates {
        let path = candidate.as_ref();
        // SAFETY: loading runs the library's initializers; the DBPU runtime
        // is trusted to be well-behaved.
        match unsafe { Library::new(path) } {
            Ok(library) => {
                debug!(path = %path.display(), "DBPU runtime library opened");
                return Ok((library, path.to_path_buf()));
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "DBPU runtime candidate rejected");
                last_error = Some(OffloadError::LibraryLoad {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        }
    }
    Err(last_error.unwrap_or(OffloadError::LibraryLoad {
        path: PathBuf::new(),
        message: "no candidate libraries configured".into(),
    }))
}

fn to_c_int(name: &str, value: usize) -> OffloadResult<c_int> {
    c_int::try_from(value)
        .map_err(|_| OffloadError::InvalidArgument(format!("{} = {} exceeds the ABI range", name, value)))
}

// ============================================================================
// Process-wide Binding
// ============================================================================

static GLOBAL_RUNTIME: OnceLock<Arc<dyn AcceleratorRuntime>> = OnceLock::new();

/// Process-wide runtime, probed once on first use from the environment's
/// candidate list.
///
/// Used by the C ABI where no owner can be threaded through; library code
/// should construct a binding explicitly and hand it to the interceptor.
pub fn global_runtime() -> Arc<dyn AcceleratorRuntime> {
    GLOBAL_RUNTIME
        .get_or_init(|| RuntimeBinding::probe(&runtime_candidates_from_env()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fake_device() -> *mut DbpuDevice {
        NonNull::<DbpuDevice>::dangling().as_ptr()
    }

    extern "C" fn init_ok(index: c_int, out: *mut *mut DbpuDevice) -> c_int {
        assert_eq!(index, 0);
        unsafe { *out = fake_device() };
        0
    }

    extern "C" fn init_fails(_index: c_int, _out: *mut *mut DbpuDevice) -> c_int {
        -1
    }

    extern "C" fn init_null(_index: c_int, out: *mut *mut DbpuDevice) -> c_int {
        unsafe { *out = std::ptr::null_mut() };
        0
    }

    /// Brute-force L2 top-k, query-major.
    extern "C" fn search_brute_force(
        _device: *mut DbpuDevice,
        queries: *const c_float,
        database: *const c_float,
        n_queries: c_int,
        n_vectors: c_int,
        dim: c_int,
        top_k: c_int,
        metric: DbpuMetric,
        distances: *mut c_float,
        ids: *mut i64,
    ) -> c_int {
        assert_eq!(metric, DbpuMetric::L2);
        let (nq, nv, d, k) = (n_queries as usize, n_vectors as usize, dim as usize, top_k as usize);
        let queries = unsafe { std::slice::from_raw_parts(queries, nq * d) };
        let database = unsafe { std::slice::from_raw_parts(database, nv * d) };
        let distances = unsafe { std::slice::from_raw_parts_mut(distances, nq * k) };
        let ids = unsafe { std::slice::from_raw_parts_mut(ids, nq * k) };

        for q in 0..nq {
            let query = &queries[q * d..(q + 1) * d];
            let mut scored: Vec<(f32, i64)> = (0..nv)
                .map(|v| {
                    let row = &database[v * d..(v + 1) * d];
                    let dist = query.iter().zip(row).map(|(a, b)| (a - b) * (a - b)).sum();
                    (dist, v as i64)
                })
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            for j in 0..k {
                let (dist, id) = scored.get(j).copied().unwrap_or((f32::INFINITY, -1));
                distances[q * k + j] = dist;
                ids[q * k + j] = id;
            }
        }
        0
    }

    extern "C" fn search_fails(
        _device: *mut DbpuDevice,
        _queries: *const c_float,
        _database: *const c_float,
        _n_queries: c_int,
        _n_vectors: c_int,
        _dim: c_int,
        _top_k: c_int,
        _metric: DbpuMetric,
        _distances: *mut c_float,
        _ids: *mut i64,
    ) -> c_int {
        -2
    }

    extern "C" fn get_perf_ok(_device: *mut DbpuDevice, out: *mut PerfRecord) -> c_int {
        unsafe {
            *out = PerfRecord {
                compute_time_us: 40,
                memcpy_h2d_time_us: 5,
                memcpy_d2h_time_us: 3,
                total_time_us: 48,
                throughput_gflops: 1.5,
            };
        }
        0
    }

    extern "C" fn get_devices_two(out: *mut c_int, max: c_int) -> c_int {
        assert!(max >= 2);
        unsafe {
            *out = 1;
            *out.add(1) = 2;
        }
        2
    }

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn destroy_counting(_device: *mut DbpuDevice) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
    }

    fn full_entry_points() -> EntryPoints {
        EntryPoints {
            get_devices: Some(get_devices_two),
            init_device: Some(init_ok),
            destroy_device: None,
            search: Some(search_brute_force),
            get_perf: Some(get_perf_ok),
        }
    }

    #[test]
    fn test_probe_missing_library_is_absent() {
        let runtime = RuntimeBinding::probe(&["/nonexistent/libdbpu-runtime.so"]);
        assert!(!runtime.is_available());
        assert!(runtime.devices().is_empty());
        assert!(runtime.last_perf().is_none());
        assert!(matches!(
            runtime.search(&[0.0; 4], 1, &[0.0; 4], 1, 4, 1),
            Err(OffloadError::RuntimeUnavailable)
        ));
        assert!(runtime.describe().starts_with("unavailable"));
    }

    #[test]
    fn test_load_with_no_candidates() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            RuntimeBinding::load(&empty),
            Err(OffloadError::LibraryLoad { .. })
        ));
    }

    #[test]
    fn test_missing_required_symbols() {
        let mut entry = full_entry_points();
        entry.init_device = None;
        let err = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap_err();
        assert!(matches!(err, OffloadError::SymbolMissing { symbol } if symbol == SYM_INIT_DEVICE));

        let mut entry = full_entry_points();
        entry.search = None;
        let err = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap_err();
        assert!(matches!(err, OffloadError::SymbolMissing { symbol } if symbol == SYM_SEARCH));
    }

    #[test]
    fn test_device_init_failure() {
        let mut entry = full_entry_points();
        entry.init_device = Some(init_fails);
        let err = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap_err();
        assert!(matches!(
            err,
            OffloadError::DeviceInit {
                status: DbpuStatus::DeviceNotFound
            }
        ));

        let mut entry = full_entry_points();
        entry.init_device = Some(init_null);
        assert!(unsafe { RuntimeBinding::from_entry_points(entry) }.is_err());
    }

    #[test]
    fn test_bound_search_is_query_major() {
        let binding = unsafe { RuntimeBinding::from_entry_points(full_entry_points()) }.unwrap();
        assert!(binding.is_available());
        assert_eq!(binding.describe(), "dbpu runtime (linked)");

        // 1-D points 0..8, queries at 0.1 and 6.9
        let database: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let queries = [0.1f32, 6.9];
        let result = binding.search(&database, 8, &queries, 2, 1, 3).unwrap();

        assert!(result.has_len(6));
        assert_eq!(&result.ids[..3], &[0, 1, 2]);
        assert_eq!(&result.ids[3..], &[7, 6, 5]);
        assert!(result.distances[0] < result.distances[1]);

        let again = binding.search(&database, 8, &queries, 2, 1, 3).unwrap();
        assert_eq!(result, again);
    }

    #[test]
    fn test_native_failure_produces_no_result() {
        let mut entry = full_entry_points();
        entry.search = Some(search_fails);
        let binding = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap();
        let err = binding.search(&[0.0; 8], 2, &[0.0; 4], 1, 4, 1).unwrap_err();
        assert!(matches!(
            err,
            OffloadError::Native {
                operation: SYM_SEARCH,
                status: DbpuStatus::OutOfMemory
            }
        ));
    }

    #[test]
    fn test_search_validates_buffers() {
        let binding = unsafe { RuntimeBinding::from_entry_points(full_entry_points()) }.unwrap();
        assert!(matches!(
            binding.search(&[0.0; 3], 1, &[0.0; 4], 1, 4, 1),
            Err(OffloadError::InvalidArgument(_))
        ));
        assert!(matches!(
            binding.search(&[0.0; 4], 1, &[0.0; 4], 1, 0, 1),
            Err(OffloadError::InvalidArgument(_))
        ));
        let empty = binding.search(&[0.0; 4], 1, &[], 0, 4, 5).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_perf_and_devices() {
        let binding = unsafe { RuntimeBinding::from_entry_points(full_entry_points()) }.unwrap();
        let perf = binding.last_perf().unwrap();
        assert_eq!(perf.total_time_us, 48);
        assert_eq!(binding.devices(), vec![DeviceKind::Simulator, DeviceKind::Fpga]);
    }

    #[test]
    fn test_optional_symbols_tolerated() {
        let mut entry = full_entry_points();
        entry.get_perf = None;
        entry.get_devices = None;
        let binding = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap();
        assert!(binding.is_available());
        assert!(!binding.supports_perf());
        assert!(binding.last_perf().is_none());
        assert!(binding.devices().is_empty());
    }

    #[test]
    fn test_drop_destroys_device_once() {
        let mut entry = full_entry_points();
        entry.destroy_device = Some(destroy_counting);
        let before = DESTROYED.load(Ordering::SeqCst);
        {
            let binding = unsafe { RuntimeBinding::from_entry_points(entry) }.unwrap();
            assert!(binding.is_available());
        }
        assert_eq!(DESTROYED.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_binding_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuntimeBinding>();
        assert_send_sync::<AbsentRuntime>();
    }

    #[test]
    fn test_metric_values_match_abi() {
        assert_eq!(DbpuMetric::L2 as i32, 0);
        assert_eq!(DbpuMetric::InnerProduct as i32, 1);
        assert_eq!(DbpuMetric::Cosine as i32, 2);
        assert_eq!(DeviceKind::from_raw(3), DeviceKind::Asic);
        assert_eq!(DeviceKind::from_raw(9), DeviceKind::Unknown(9));
    }
}
