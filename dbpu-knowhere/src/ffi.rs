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

//! C ABI for the host engine
//!
//! The host describes a search with [`DbpuSearchRequest`], passes its own CPU
//! search as a callback and receives a [`DbpuSearchResult`] that it must
//! release with [`dbpu_search_result_free`].
//!
//! ```c
//! int  dbpu_intercept_search(const dbpu_search_request_t* req,
//!                            dbpu_cpu_search_fn fallback, void* user_data,
//!                            dbpu_search_result_t* out);
//! void dbpu_search_result_free(dbpu_search_result_t* result);
//! bool dbpu_is_available(void);
//! ```
//!
//! The process-wide interceptor is configured from the `DBPU_*` environment
//! on first use.

use std::ffi::{CStr, c_void};
use std::os::raw::{c_char, c_float, c_int};
use std::panic::{AssertUnwindSafe, UnwindSafe, catch_unwind};
use std::ptr;
use std::slice;
use std::sync::OnceLock;

use dbpu_offload::{
    DbpuStatus, InterceptorConfig, OffloadError, OffloadResult, SearchInterceptor, SearchRequest,
    SearchResult, global_runtime,
};
use tracing::warn;

/// Returned when the interceptor itself panicked
pub const DBPU_KN_INTERNAL_ERROR: c_int = -100;

/// Search descriptor filled in by the host.
///
/// Buffers are row-major `f32`; `vectors` holds `n_vectors * dim` values and
/// `queries` holds `n_queries * dim`. `index_params` and `search_params` are
/// optional NUL-terminated strings, null when absent.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DbpuSearchRequest {
    pub vectors: *const c_float,
    pub n_vectors: usize,
    pub queries: *const c_float,
    pub n_queries: usize,
    pub dim: usize,
    pub top_k: usize,
    pub index_type: *const c_char,
    pub index_params: *const c_char,
    pub search_params: *const c_char,
}

/// Result descriptor owned by this library until released.
///
/// `distances` and `ids` each hold `len` entries, query-major.
#[repr(C)]
#[derive(Debug)]
pub struct DbpuSearchResult {
    pub distances: *mut c_float,
    pub ids: *mut i64,
    pub len: usize,
}

impl DbpuSearchResult {
    pub const fn empty() -> Self {
        Self {
            distances: ptr::null_mut(),
            ids: ptr::null_mut(),
            len: 0,
        }
    }

    fn from_result(result: SearchResult) -> Self {
        let len = result.len();
        let distances = Box::into_raw(result.distances.into_boxed_slice()) as *mut c_float;
        let ids = Box::into_raw(result.ids.into_boxed_slice()) as *mut i64;
        Self { distances, ids, len }
    }
}

/// Host CPU search.
///
/// Must write `n_queries * top_k` distances and ids and return 0, or return a
/// non-zero status which is passed back to the caller unchanged.
pub type DbpuCpuSearchFn = unsafe extern "C" fn(
    request: *const DbpuSearchRequest,
    distances: *mut c_float,
    ids: *mut i64,
    user_data: *mut c_void,
) -> c_int;

static INTERCEPTOR: OnceLock<SearchInterceptor> = OnceLock::new();

fn interceptor() -> &'static SearchInterceptor {
    INTERCEPTOR.get_or_init(|| {
        SearchInterceptor::with_runtime(global_runtime(), &InterceptorConfig::from_env())
    })
}

// ============================================================================
// Exports
// ============================================================================

/// Run one search through the process-wide interceptor.
///
/// Returns 0 and fills `out` on success. Returns the invalid-argument status
/// for a malformed descriptor, the fallback's own status if the CPU path
/// fails, or [`DBPU_KN_INTERNAL_ERROR`]. `out` is left empty on failure.
///
/// # Safety
/// `request` must point to a valid descriptor whose buffers match its
/// counts, and `out` must be writable. The fallback is called at most once,
/// on the calling thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dbpu_intercept_search(
    request: *const DbpuSearchRequest,
    fallback: Option<DbpuCpuSearchFn>,
    user_data: *mut c_void,
    out: *mut DbpuSearchResult,
) -> c_int {
    if request.is_null() || out.is_null() || fallback.is_none() {
        return DbpuStatus::InvalidArgument.code();
    }
    unsafe { intercept_guarded(interceptor, request, fallback, user_data, out) }
}

/// Release a result filled by [`dbpu_intercept_search`]. Null and empty
/// results are ignored; the descriptor is reset so a second call is a no-op.
///
/// # Safety
/// `result` must be null or a descriptor filled by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn dbpu_search_result_free(result: *mut DbpuSearchResult) {
    let Some(result) = (unsafe { result.as_mut() }) else {
        return;
    };
    let taken = std::mem::replace(result, DbpuSearchResult::empty());
    // SAFETY: non-null buffers came from `from_result` with this length.
    unsafe {
        if !taken.distances.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                taken.distances,
                taken.len,
            )));
        }
        if !taken.ids.is_null() {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(taken.ids, taken.len)));
        }
    }
}

/// Whether the accelerator runtime is bound in this process.
#[unsafe(no_mangle)]
pub extern "C" fn dbpu_is_available() -> bool {
    catch_unwind(|| interceptor().is_accelerator_available()).unwrap_or(false)
}

// ============================================================================
// Internals
// ============================================================================

/// Resolve the interceptor inside `catch_unwind`, then run the search.
///
/// # Safety
/// Same contract as [`dbpu_intercept_search`].
unsafe fn intercept_guarded<'a, S>(
    setup: S,
    request: *const DbpuSearchRequest,
    fallback: Option<DbpuCpuSearchFn>,
    user_data: *mut c_void,
    out: *mut DbpuSearchResult,
) -> c_int
where
    S: FnOnce() -> &'a SearchInterceptor + UnwindSafe,
{
    match catch_unwind(setup) {
        Ok(interceptor) => unsafe { intercept_with(interceptor, request, fallback, user_data, out) },
        Err(_) => {
            warn!("panic while setting up the DBPU interceptor");
            if !out.is_null() {
                unsafe { out.write(DbpuSearchResult::empty()) };
            }
            DBPU_KN_INTERNAL_ERROR
        }
    }
}

/// Body of [`dbpu_intercept_search`] against an explicit interceptor.
///
/// # Safety
/// Same contract as [`dbpu_intercept_search`].
pub unsafe fn intercept_with(
    interceptor: &SearchInterceptor,
    request: *const DbpuSearchRequest,
    fallback: Option<DbpuCpuSearchFn>,
    user_data: *mut c_void,
    out: *mut DbpuSearchResult,
) -> c_int {
    let (Some(descriptor), Some(fallback)) = (unsafe { request.as_ref() }, fallback) else {
        return DbpuStatus::InvalidArgument.code();
    };
    if out.is_null() {
        return DbpuStatus::InvalidArgument.code();
    }
    unsafe { out.write(DbpuSearchResult::empty()) };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let search = match unsafe { borrow_request(descriptor) } {
            Ok(search) => search,
            Err(e) => {
                warn!(error = %e, "rejected search descriptor");
                return Err(DbpuStatus::InvalidArgument.code());
            }
        };
        interceptor.intercept_search(&search, |search| {
            let mut result = SearchResult::zeroed(search.n_queries, search.top_k);
            // SAFETY: output buffers hold n_queries * top_k entries.
            let status = unsafe {
                fallback(
                    descriptor,
                    result.distances.as_mut_ptr(),
                    result.ids.as_mut_ptr(),
                    user_data,
                )
            };
            if status == 0 { Ok(result) } else { Err(status) }
        })
    }));

    match outcome {
        Ok(Ok(result)) => {
            unsafe { out.write(DbpuSearchResult::from_result(result)) };
            0
        }
        Ok(Err(status)) => status,
        Err(_) => {
            warn!("panic inside dbpu_intercept_search");
            DBPU_KN_INTERNAL_ERROR
        }
    }
}

/// View a C descriptor as a [`SearchRequest`].
///
/// # Safety
/// Non-null pointers in `descriptor` must be valid for their counts and the
/// strings NUL-terminated.
unsafe fn borrow_request(descriptor: &DbpuSearchRequest) -> OffloadResult<SearchRequest<'_>> {
    if descriptor.dim == 0 {
        return Err(OffloadError::InvalidArgument("dimension must be positive".into()));
    }
    let dim = descriptor.dim;
    let vectors = unsafe { borrow_floats("vectors", descriptor.vectors, descriptor.n_vectors, dim)? };
    let queries = unsafe { borrow_floats("queries", descriptor.queries, descriptor.n_queries, dim)? };
    let index_type = unsafe { borrow_str("index_type", descriptor.index_type)? }.unwrap_or("");

    let mut request = SearchRequest::new(vectors, queries, dim, descriptor.top_k, index_type);
    if let Some(params) = unsafe { borrow_str("index_params", descriptor.index_params)? } {
        request = request.with_index_params(params);
    }
    if let Some(params) = unsafe { borrow_str("search_params", descriptor.search_params)? } {
        request = request.with_search_params(params);
    }
    request.validate()?;
    Ok(request)
}

unsafe fn borrow_floats<'a>(
    name: &str,
    data: *const c_float,
    count: usize,
    dim: usize,
) -> OffloadResult<&'a [f32]> {
    let len = count
        .checked_mul(dim)
        .ok_or_else(|| OffloadError::InvalidArgument(format!("{} size overflows", name)))?;
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(OffloadError::InvalidArgument(format!("{} is null", name)));
    }
    Ok(unsafe { slice::from_raw_parts(data, len) })
}

unsafe fn borrow_str<'a>(name: &str, s: *const c_char) -> OffloadResult<Option<&'a str>> {
    if s.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .map(Some)
        .map_err(|_| OffloadError::InvalidArgument(format!("{} is not valid UTF-8", name)))
}
