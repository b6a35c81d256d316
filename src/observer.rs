//! Observer trait for submission events.
//!
//! Inject an [`Arc<dyn SubmissionObserver>`] via
//! [`crate::config::ServiceConfigBuilder::observer`] or
//! [`crate::UploadOrchestrator::with_observer`] to follow a submission as the
//! state machine advances: a UI can add a card as soon as the scan diagnosis
//! lands, before the table extraction has answered.
//!
//! # Example
//!
//! ```rust
//! use heartscan::{DiagnosisRecord, SubmissionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl SubmissionObserver for Counter {
//!     fn on_record_added(&self, record: &DiagnosisRecord) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("new {} record {}", record.kind(), record.id);
//!     }
//! }
//! ```

use crate::error::{ServiceError, ServiceKind};
use crate::record::{DiagnosisRecord, RecordId};
use std::sync::Arc;

/// Called by [`crate::UploadOrchestrator`] while a submission runs.
///
/// Every method is called on the submitting task, in order, and has a no-op
/// default so implementations only override what they care about.
/// Rejected submissions (missing image, invalid image, busy) produce no
/// events.
pub trait SubmissionObserver: Send + Sync {
    /// The orchestrator entered `Submitting`.
    fn on_submit_start(&self, has_document: bool) {
        let _ = has_document;
    }

    /// A backend request is about to be sent.
    fn on_call_start(&self, service: ServiceKind) {
        let _ = service;
    }

    /// A record was committed to the store.
    fn on_record_added(&self, record: &DiagnosisRecord) {
        let _ = record;
    }

    /// A backend call failed.
    fn on_call_failed(&self, service: ServiceKind, error: &ServiceError) {
        let _ = (service, error);
    }

    /// The orchestrator is back to `Idle`.
    ///
    /// `records_added` lists what this submission committed, in order, and
    /// is non-empty after a partial failure.
    fn on_submit_complete(&self, records_added: &[RecordId]) {
        let _ = records_added;
    }
}

/// Default observer: ignores everything.
pub struct NoopObserver;

impl SubmissionObserver for NoopObserver {}

/// Shared observer handle as stored in [`crate::config::ServiceConfig`].
pub type ObserverHandle = Arc<dyn SubmissionObserver>;
