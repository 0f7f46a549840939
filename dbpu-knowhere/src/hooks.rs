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

//! Host hook shims
//!
//! Resolved by name and called by the host engine around its own search
//! calls. Each writes one marker line to stderr and returns; they own no
//! state and must never fail, whatever thread or context they run on.

use std::io::{self, Write};

const PRE_SEARCH_MARKER: &[u8] = b"[DBPU] pre_search_hook\n";
const POST_SEARCH_MARKER: &[u8] = b"[DBPU] post_search_hook\n";

#[inline]
fn mark(line: &[u8]) {
    // Single unbuffered write; errors (closed stderr) are dropped.
    let _ = io::stderr().lock().write_all(line);
}

/// Called by the host before a search.
#[unsafe(no_mangle)]
pub extern "C" fn dbpu_kn_pre_search_hook() {
    mark(PRE_SEARCH_MARKER);
}

/// Called by the host after a search.
#[unsafe(no_mangle)]
pub extern "C" fn dbpu_kn_post_search_hook() {
    mark(POST_SEARCH_MARKER);
}
