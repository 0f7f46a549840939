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

//! # DBPU Knowhere Bridge
//!
//! C ABI exported to the Knowhere vector engine. Built as a `cdylib` the
//! host loads next to its own search library.
//!
//! - [`hooks`]: `dbpu_kn_pre_search_hook` / `dbpu_kn_post_search_hook`,
//!   stateless trace markers the host calls around a search
//! - [`ffi`]: `dbpu_intercept_search`, `dbpu_search_result_free` and
//!   `dbpu_is_available`, backed by one process-wide
//!   [`SearchInterceptor`](dbpu_offload::SearchInterceptor)
//!
//! No exported function unwinds into the host.

pub mod ffi;
pub mod hooks;

pub use ffi::{
    DBPU_KN_INTERNAL_ERROR, DbpuCpuSearchFn, DbpuSearchRequest, DbpuSearchResult,
    dbpu_intercept_search, dbpu_is_available, dbpu_search_result_free, intercept_with,
};
pub use hooks::{dbpu_kn_post_search_hook, dbpu_kn_pre_search_hook};
