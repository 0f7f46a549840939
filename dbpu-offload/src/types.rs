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

//! Request and result types shared by both execution paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OffloadError, OffloadResult};

/// Search-structure family of the index being queried.
///
/// Parsed case-insensitively from the host's tag (`"FLAT"`, `"ivf_flat"`, ...)
/// and rendered back in the canonical upper-case form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum IndexKind {
    /// Exhaustive scan
    Flat,
    /// Inverted file, raw vectors
    IvfFlat,
    /// Inverted file, scalar quantized
    IvfSq8,
    /// Inverted file, product quantized
    IvfPq,
    /// Graph-based
    Hnsw,
    /// Any tag the arbitration layer does not know
    Other(String),
}

impl IndexKind {
    /// Canonical tag
    pub fn as_str(&self) -> &str {
        match self {
            Self::Flat => "FLAT",
            Self::IvfFlat => "IVF_FLAT",
            Self::IvfSq8 => "IVF_SQ8",
            Self::IvfPq => "IVF_PQ",
            Self::Hnsw => "HNSW",
            Self::Other(tag) => tag,
        }
    }

    /// Graph traversal does not map onto the accelerator's scan engine.
    pub fn is_graph_based(&self) -> bool {
        matches!(self, Self::Hnsw)
    }
}

impl From<&str> for IndexKind {
    fn from(tag: &str) -> Self {
        let canonical = tag.trim().to_ascii_uppercase();
        match canonical.as_str() {
            "FLAT" => Self::Flat,
            "IVF_FLAT" => Self::IvfFlat,
            "IVF_SQ8" => Self::IvfSq8,
            "IVF_PQ" => Self::IvfPq,
            "HNSW" => Self::Hnsw,
            _ => Self::Other(canonical),
        }
    }
}

impl From<String> for IndexKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<IndexKind> for String {
    fn from(kind: IndexKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for IndexKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed view over one search call.
///
/// Buffers are row-major and owned by the caller; nothing in this crate
/// copies them.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    /// Dataset, `n_vectors * dim` floats
    pub vectors: &'a [f32],
    pub n_vectors: usize,
    /// Query batch, `n_queries * dim` floats
    pub queries: &'a [f32],
    pub n_queries: usize,
    pub dim: usize,
    pub top_k: usize,
    pub index_kind: IndexKind,
    /// Opaque index build parameters (JSON from the host, unparsed)
    pub index_params: Option<&'a str>,
    /// Opaque search parameters (JSON from the host, unparsed)
    pub search_params: Option<&'a str>,
}

impl<'a> SearchRequest<'a> {
    /// Build a request, deriving vector and query counts from buffer lengths.
    pub fn new(
        vectors: &'a [f32],
        queries: &'a [f32],
        dim: usize,
        top_k: usize,
        index_kind: impl Into<IndexKind>,
    ) -> Self {
        let (n_vectors, n_queries) = if dim == 0 {
            (0, 0)
        } else {
            (vectors.len() / dim, queries.len() / dim)
        };
        Self {
            vectors,
            n_vectors,
            queries,
            n_queries,
            dim,
            top_k,
            index_kind: index_kind.into(),
            index_params: None,
            search_params: None,
        }
    }

    pub fn with_index_params(mut self, params: &'a str) -> Self {
        self.index_params = Some(params);
        self
    }

    pub fn with_search_params(mut self, params: &'a str) -> Self {
        self.search_params = Some(params);
        self
    }

    /// Number of entries every result for this request must carry
    #[inline]
    pub fn expected_result_len(&self) -> usize {
        self.n_queries * self.top_k
    }

    /// Check that declared counts fit in the supplied buffers.
    pub fn validate(&self) -> OffloadResult<()> {
        if self.dim == 0 && (self.n_vectors > 0 || self.n_queries > 0) {
            return Err(OffloadError::InvalidArgument(
                "dimension must be positive".into(),
            ));
        }
        check_buffer("vectors", self.vectors.len(), self.n_vectors, self.dim)?;
        check_buffer("queries", self.queries.len(), self.n_queries, self.dim)?;
        Ok(())
    }
}

pub(crate) fn check_buffer(name: &str, len: usize, count: usize, dim: usize) -> OffloadResult<()> {
    let needed = count
        .checked_mul(dim)
        .ok_or_else(|| OffloadError::InvalidArgument(format!("{} size overflows", name)))?;
    if len < needed {
        return Err(OffloadError::InvalidArgument(format!(
            "{} buffer holds {} floats, {} x {} requires {}",
            name, len, count, dim, needed
        )));
    }
    Ok(())
}

/// Owned search output, query-major: all `top_k` hits of query 0, then
/// query 1, and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub distances: Vec<f32>,
    pub ids: Vec<i64>,
}

impl SearchResult {
    /// Zero-filled buffers for `n_queries * top_k` hits
    pub fn zeroed(n_queries: usize, top_k: usize) -> Self {
        let len = n_queries * top_k;
        Self {
            distances: vec![0.0; len],
            ids: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// True when both sequences hold exactly `expected` entries
    pub fn has_len(&self, expected: usize) -> bool {
        self.distances.len() == expected && self.ids.len() == expected
    }

    /// Hits of one query, or `None` past the end.
    pub fn query_hits(&self, query: usize, top_k: usize) -> Option<(&[f32], &[i64])> {
        let start = query.checked_mul(top_k)?;
        let end = start.checked_add(top_k)?;
        Some((self.distances.get(start..end)?, self.ids.get(start..end)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_kind_parsing() {
        assert_eq!(IndexKind::from("FLAT"), IndexKind::Flat);
        assert_eq!(IndexKind::from("ivf_flat"), IndexKind::IvfFlat);
        assert_eq!(IndexKind::from(" IVF_PQ "), IndexKind::IvfPq);
        assert_eq!(IndexKind::from("hnsw"), IndexKind::Hnsw);
        assert_eq!(
            IndexKind::from("DISKANN"),
            IndexKind::Other("DISKANN".to_string())
        );
        assert_eq!(IndexKind::from(" diskann"), IndexKind::from("DiskANN"));
        assert_eq!(IndexKind::from("diskann").to_string(), "DISKANN");
        assert_eq!(IndexKind::IvfSq8.to_string(), "IVF_SQ8");
        assert!(IndexKind::Hnsw.is_graph_based());
        assert!(!IndexKind::Flat.is_graph_based());
    }

    #[test]
    fn test_index_kind_serde_as_tag() {
        let json = serde_json::to_string(&IndexKind::IvfFlat).unwrap();
        assert_eq!(json, "\"IVF_FLAT\"");
        let kind: IndexKind = serde_json::from_str("\"hnsw\"").unwrap();
        assert_eq!(kind, IndexKind::Hnsw);
    }

    #[test]
    fn test_request_counts_from_buffers() {
        let vectors = vec![0.0f32; 16 * 4];
        let queries = vec![0.0f32; 2 * 4];
        let req = SearchRequest::new(&vectors, &queries, 4, 3, "FLAT");
        assert_eq!(req.n_vectors, 16);
        assert_eq!(req.n_queries, 2);
        assert_eq!(req.expected_result_len(), 6);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_validate_rejects_short_buffers() {
        let vectors = vec![0.0f32; 8];
        let queries = vec![0.0f32; 4];
        let mut req = SearchRequest::new(&vectors, &queries, 4, 1, "FLAT");
        req.n_vectors = 3;
        assert!(matches!(
            req.validate(),
            Err(OffloadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_result_query_hits() {
        let result = SearchResult {
            distances: vec![0.1, 0.2, 1.1, 1.2],
            ids: vec![10, 20, 30, 40],
        };
        let (d, i) = result.query_hits(1, 2).unwrap();
        assert_eq!(d, &[1.1, 1.2]);
        assert_eq!(i, &[30, 40]);
        assert!(result.query_hits(2, 2).is_none());
        assert!(result.has_len(4));
        assert!(SearchResult::zeroed(3, 5).has_len(15));
    }
}
