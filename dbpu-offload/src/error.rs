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

//! Offload error types
//!
//! Binding and execution failures are recovered inside the crate; these
//! variants only travel between the runtime binding, the interceptor and
//! the diagnostic tooling.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for offload operations
pub type OffloadResult<T> = Result<T, OffloadError>;

/// Offload error types
#[derive(Error, Debug)]
pub enum OffloadError {
    /// The accelerator runtime is not bound in this process
    #[error("DBPU runtime unavailable")]
    RuntimeUnavailable,

    /// No candidate library could be opened
    #[error("failed to load runtime library {path}: {message}")]
    LibraryLoad { path: PathBuf, message: String },

    /// A required entry point is missing from the loaded library
    #[error("required symbol `{symbol}` not found")]
    SymbolMissing { symbol: &'static str },

    /// Device 0 could not be initialized
    #[error("device initialization failed: {status}")]
    DeviceInit { status: DbpuStatus },

    /// A native call returned a non-success status
    #[error("{operation} failed: {status}")]
    Native {
        operation: &'static str,
        status: DbpuStatus,
    },

    /// The runtime adapter panicked during a call
    #[error("accelerator runtime panicked during {operation}")]
    Panicked { operation: &'static str },

    /// Request shape does not match the supplied buffers
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or failed validation
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O error while reading configuration or writing events
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OffloadError {
    pub(crate) fn native(operation: &'static str, status: DbpuStatus) -> Self {
        Self::Native { operation, status }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Status codes returned by the DBPU runtime ABI.
///
/// Every value other than `Success` is a failure; callers do not
/// distinguish between them beyond reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbpuStatus {
    Success,
    DeviceNotFound,
    OutOfMemory,
    InvalidArgument,
    Timeout,
    NotImplemented,
    /// Code outside the documented range
    Unknown(i32),
}

impl DbpuStatus {
    /// Map a raw ABI status code
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::DeviceNotFound,
            -2 => Self::OutOfMemory,
            -3 => Self::InvalidArgument,
            -4 => Self::Timeout,
            -5 => Self::NotImplemented,
            other => Self::Unknown(other),
        }
    }

    /// Raw ABI code for this status
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::DeviceNotFound => -1,
            Self::OutOfMemory => -2,
            Self::InvalidArgument => -3,
            Self::Timeout => -4,
            Self::NotImplemented => -5,
            Self::Unknown(code) => code,
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// `Ok(())` on success, the status itself otherwise
    #[inline]
    pub fn check(self) -> Result<(), DbpuStatus> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for DbpuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Timeout => write!(f, "timeout"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::Unknown(code) => write!(f, "unknown status {}", code),
        }
    }
}
