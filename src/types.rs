//! Wire types for the Key-Value API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::HistoryQuery;

/// Response from `generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Newly issued 5-word token
    pub token: String,
}

/// Response from `store`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreResponse {
    /// Human readable status message
    #[serde(default)]
    pub message: Option<String>,
    /// Stored size in bytes
    pub size: u64,
    /// Storage tier the token belongs to
    pub tier: String,
    /// Version assigned by the server
    pub version: u64,
    /// Time of this write
    pub updated_at: DateTime<Utc>,
    /// Expiry, when a TTL is set
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response from `retrieve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    /// The stored JSON document
    pub data: Value,
    /// Current version
    pub version: u64,
    /// Time of the last write
    pub updated_at: DateTime<Utc>,
    /// Expiry, when a TTL is set
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response from `delete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Human readable status message
    #[serde(default)]
    pub message: String,
}

/// Partial update applied by `patch`.
///
/// Keys of `set` and entries of `remove` are dotted paths (`"profile.name"`).
/// Their meaning is defined by the server; the client forwards them as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchOperations {
    /// Paths to assign
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Map<String, Value>>,
    /// Paths to delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<Vec<String>>,
}

impl PatchOperations {
    /// Empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` at `path`
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set
            .get_or_insert_with(Map::new)
            .insert(path.into(), value.into());
        self
    }

    /// Remove the field at `path`
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.remove.get_or_insert_with(Vec::new).push(path.into());
        self
    }

    /// True when neither `set` nor `remove` carries anything
    pub fn is_empty(&self) -> bool {
        self.set.as_ref().map_or(true, |s| s.is_empty())
            && self.remove.as_ref().map_or(true, |r| r.is_empty())
    }
}

/// Response from `patch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchResponse {
    /// New version
    pub version: u64,
    /// Document after the patch
    pub data: Value,
    /// Time of this write
    pub updated_at: DateTime<Utc>,
    /// Expiry, when a TTL is set
    pub expires_at: Option<DateTime<Utc>>,
    /// Stored size in bytes
    pub size: u64,
    /// Storage tier
    pub tier: String,
}

/// One immutable entry of a token's history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position in the log, assigned by the server
    pub seq: u64,
    /// When the event was recorded
    pub created_at: DateTime<Utc>,
    /// When the event expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Type inferred by the server's classifier
    #[serde(default)]
    pub classified_type: Option<String>,
    /// Extracted numeric reading
    #[serde(default)]
    pub numeric_value: Option<f64>,
    /// Extracted text reading
    #[serde(default)]
    pub text_value: Option<String>,
    /// Classifier confidence
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Raw stored payload
    #[serde(default)]
    pub payload: Value,
}

/// Pagination block of a history response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPagination {
    /// Page size that was applied
    pub limit: u32,
    /// Exclusive `seq` upper bound that was applied
    #[serde(default)]
    pub before: Option<u64>,
    /// Inclusive `created_at` lower bound that was applied
    #[serde(default)]
    pub since: Option<String>,
    /// Whether older events exist beyond this page
    pub has_more: bool,
}

/// Response from `history`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Events on this page, newest first
    pub events: Vec<HistoryEvent>,
    /// Pagination info
    pub pagination: HistoryPagination,
}

impl HistoryResponse {
    /// Query for the next (older) page, or `None` when the server reports
    /// no more events.
    ///
    /// Keeps every filter of `current` and moves `before` to the smallest
    /// `seq` on this page.
    pub fn next_page(&self, current: &HistoryQuery) -> Option<HistoryQuery> {
        if !self.pagination.has_more {
            return None;
        }
        let oldest = self.events.iter().map(|e| e.seq).min()?;
        Some(current.clone().before(oldest))
    }
}

/// One operation of a batch request, tagged by `action` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BatchOperation {
    /// Store `data` under `token`
    Store {
        /// Target token
        token: String,
        /// Document to store
        data: Value,
        /// Optional TTL in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u64>,
    },
    /// Read the document under `token`
    Retrieve {
        /// Target token
        token: String,
    },
    /// Delete the document under `token`
    Delete {
        /// Target token
        token: String,
    },
    /// Apply a partial update guarded by `version`
    Patch {
        /// Target token
        token: String,
        /// Expected current version
        version: u64,
        /// Operations to apply
        patch: PatchOperations,
        /// Optional TTL in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u64>,
    },
}

impl BatchOperation {
    /// Store operation
    pub fn store(token: impl Into<String>, data: Value) -> Self {
        BatchOperation::Store {
            token: token.into(),
            data,
            ttl: None,
        }
    }

    /// Retrieve operation
    pub fn retrieve(token: impl Into<String>) -> Self {
        BatchOperation::Retrieve {
            token: token.into(),
        }
    }

    /// Delete operation
    pub fn delete(token: impl Into<String>) -> Self {
        BatchOperation::Delete {
            token: token.into(),
        }
    }

    /// Patch operation
    pub fn patch(token: impl Into<String>, version: u64, patch: PatchOperations) -> Self {
        BatchOperation::Patch {
            token: token.into(),
            version,
            patch,
            ttl: None,
        }
    }

    /// Set the TTL. Ignored for retrieve and delete.
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        match &mut self {
            BatchOperation::Store { ttl, .. } | BatchOperation::Patch { ttl, .. } => {
                *ttl = Some(seconds)
            }
            BatchOperation::Retrieve { .. } | BatchOperation::Delete { .. } => {}
        }
        self
    }

    /// Token this operation targets
    pub fn token(&self) -> &str {
        match self {
            BatchOperation::Store { token, .. }
            | BatchOperation::Retrieve { token }
            | BatchOperation::Delete { token }
            | BatchOperation::Patch { token, .. } => token,
        }
    }

    /// Wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            BatchOperation::Store { .. } => "store",
            BatchOperation::Retrieve { .. } => "retrieve",
            BatchOperation::Delete { .. } => "delete",
            BatchOperation::Patch { .. } => "patch",
        }
    }
}

/// Result of a single batch operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Whether this operation succeeded
    pub success: bool,
    /// Token the operation targeted. Empty when the server omits it.
    #[serde(default)]
    pub token: String,
    /// Action that was executed. Empty when the server omits it.
    #[serde(default)]
    pub action: String,
    /// Returned document (retrieve, patch)
    #[serde(default)]
    pub data: Option<Value>,
    /// Resulting version (store, retrieve, patch)
    #[serde(default)]
    pub version: Option<u64>,
    /// Failure reason
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchResult {
    /// Returns true if this result indicates an error
    pub fn is_error(&self) -> bool {
        !self.success
    }
}

/// Aggregate counts of a batch response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of operations
    pub total: u32,
    /// Number that succeeded
    pub succeeded: u32,
    /// Number that failed
    pub failed: u32,
    /// Success rate as formatted by the server (e.g. "66.7%")
    #[serde(rename = "successRate")]
    pub success_rate: String,
}

/// Response from `batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// One result per operation, in request order
    pub results: Vec<BatchResult>,
    /// Aggregate counts
    pub summary: BatchSummary,
}
