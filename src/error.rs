//! Error types for the heartscan library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ValidationError`]: **Local**: the selected image has an encoding
//!   outside the allow-list. Raised before any network call is possible.
//!
//! * [`ServiceError`]: **Per-call**: one backend (prediction or table
//!   extraction) rejected the request, returned something unusable, or could
//!   not be reached at all. Cloneable and serialisable so UI collaborators
//!   can keep it next to the records it concerns.
//!
//! * [`DiagnoseError`]: **Per-submission**: what `submit` hands back to the
//!   caller. It wraps the two above and adds the orchestration failures
//!   (missing image, busy, bad configuration).
//!
//! None of these is fatal to the process: after any of them the orchestrator
//! is idle again and accepts the next submission.

use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned from [`crate::UploadOrchestrator::submit`] and the
/// crate's constructors.
#[derive(Debug, Error)]
pub enum DiagnoseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// `submit` was called without a scan image.
    #[error("No scan image selected.\nA retinal scan image is required before diagnosing.")]
    MissingImage,

    /// The image is not one of the accepted encodings.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An attachment could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Orchestration errors ─────────────────────────────────────────────
    /// Another submission is still in flight; this one was rejected, not queued.
    #[error("A diagnosis is already in progress. Wait for it to finish and try again.")]
    Busy,

    /// The primary (image prediction) call failed. Nothing was recorded.
    #[error("Diagnosis failed: {0}")]
    Predict(#[source] ServiceError),

    /// The prediction succeeded and was recorded as `retained`, but the
    /// secondary (table extraction) call failed.
    #[error("Table extraction failed: {source}\nThe scan diagnosis (record {retained}) was kept.")]
    TableExtraction {
        retained: RecordId,
        #[source]
        source: ServiceError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiagnoseError {
    /// The per-call service failure behind this error, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            DiagnoseError::Predict(e) => Some(e),
            DiagnoseError::TableExtraction { source, .. } => Some(source),
            _ => None,
        }
    }

    /// True when the submission committed at least one record before failing.
    pub fn is_partial(&self) -> bool {
        matches!(self, DiagnoseError::TableExtraction { .. })
    }
}

/// The selected image was rejected by the input validator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}")]
pub struct ValidationError {
    /// MIME type that was offered.
    pub mime_type: String,
    /// User-facing explanation.
    pub reason: String,
}

/// Which backend a [`ServiceError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Image prediction endpoint (primary call).
    Predict,
    /// Document table-extraction endpoint (secondary call).
    ExtractTable,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Predict => f.write_str("prediction service"),
            ServiceKind::ExtractTable => f.write_str("table extraction service"),
        }
    }
}

/// How a backend call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend answered with a non-2xx status.
    Rejected { status: u16 },
    /// 2xx, but the body carried `success: false` or an explicit `error`.
    Refused,
    /// No response at all (DNS, connect, reset).
    Unreachable,
    /// No response within the per-call timeout.
    Timeout,
    /// 2xx, but the body was not the expected JSON.
    MalformedResponse,
    /// The request could not be built (bad MIME string, etc.).
    InvalidRequest,
}

/// A single failed backend call.
///
/// `message` is what the user sees: the backend's structured `error` field
/// when it sent one, otherwise a generic fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ServiceError {
    pub service: ServiceKind,
    pub failure: FailureKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: ServiceKind, failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            service,
            failure,
            message: message.into(),
        }
    }

    /// Failed to connect to the backend.
    pub fn unreachable(service: ServiceKind, detail: impl fmt::Display) -> Self {
        Self::new(
            service,
            FailureKind::Unreachable,
            format!("Failed to connect to the {service}: {detail}"),
        )
    }

    /// The per-call timeout elapsed.
    pub fn timeout(service: ServiceKind, secs: u64) -> Self {
        Self::new(
            service,
            FailureKind::Timeout,
            format!("The {service} did not respond within {secs}s"),
        )
    }

    /// True when no response was received at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self.failure, FailureKind::Unreachable | FailureKind::Timeout)
    }

    /// HTTP status, for `Rejected` failures.
    pub fn status(&self) -> Option<u16> {
        match self.failure {
            FailureKind::Rejected { status } => Some(status),
            _ => None,
        }
    }
}
