//! The submission state machine.
//!
//! ```text
//!            submit(image, document?)
//!   Idle ───────────────────────────▶ Submitting
//!    ▲                                    │
//!    │  1. predict(image, document?) ─────┤ failure → Err(Predict), nothing stored
//!    │     append Retinal record          │
//!    │  2. extract_table(document)  ──────┤ failure → Err(TableExtraction), Retinal kept
//!    │     append Table record            │
//!    └────────────────────────────────────┘
//! ```
//!
//! The two calls run strictly one after the other: table extraction is only
//! attempted once the prediction has succeeded. A committed record is never
//! rolled back by a later failure in the same submission.
//!
//! At most one submission runs at a time. A `submit` issued while another is
//! in flight is rejected with [`DiagnoseError::Busy`]; there is no queue.

use crate::config::ServiceConfig;
use crate::error::{DiagnoseError, ServiceKind};
use crate::observer::{NoopObserver, ObserverHandle};
use crate::record::{DiagnosisRecord, NewRecord, RecordId};
use crate::service::{ExtractService, HttpExtractService, HttpPredictService, PredictService};
use crate::store::DiagnosisStore;
use crate::validate::{Attachment, ValidatedImage};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Submitting,
}

/// What a successful submission committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    /// The Retinal record.
    pub retinal: RecordId,
    /// The Table record, when a document was supplied.
    pub table: Option<RecordId>,
    pub duration_ms: u64,
}

impl SubmitReport {
    /// Appended ids, in store order.
    pub fn record_ids(&self) -> Vec<RecordId> {
        std::iter::once(self.retinal).chain(self.table).collect()
    }
}

/// Sequences the prediction and table-extraction calls and owns the
/// resulting records.
///
/// `submit` and `clear` take `&self`, so the orchestrator can be shared
/// behind an `Arc` between a UI task and whatever triggers submissions.
pub struct UploadOrchestrator {
    predictor: Arc<dyn PredictService>,
    extractor: Arc<dyn ExtractService>,
    observer: ObserverHandle,
    store: Mutex<DiagnosisStore>,
    busy: AtomicBool,
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("state", &self.state())
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}

/// Clears the busy flag when dropped, whatever path `submit` takes out.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl UploadOrchestrator {
    pub fn new(predictor: Arc<dyn PredictService>, extractor: Arc<dyn ExtractService>) -> Self {
        Self {
            predictor,
            extractor,
            observer: Arc::new(NoopObserver),
            store: Mutex::new(DiagnosisStore::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// Wire the HTTP clients described by `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DiagnoseError> {
        let predictor = HttpPredictService::from_config(config)?;
        let extractor = HttpExtractService::from_config(config)?;
        info!(
            "Orchestrator: predict → {}, extract → {}",
            predictor.endpoint(),
            extractor.endpoint()
        );
        let mut orchestrator = Self::new(Arc::new(predictor), Arc::new(extractor));
        if let Some(ref observer) = config.observer {
            orchestrator.observer = Arc::clone(observer);
        }
        Ok(orchestrator)
    }

    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = observer;
        self
    }

    /// Run one submission.
    ///
    /// # Errors
    /// - [`DiagnoseError::MissingImage`], [`DiagnoseError::Validation`],
    ///   [`DiagnoseError::Busy`]: rejected up front; no call made, nothing stored.
    /// - [`DiagnoseError::Predict`]: the primary call failed; table extraction
    ///   was not attempted and nothing was stored.
    /// - [`DiagnoseError::TableExtraction`]: the Retinal record was stored
    ///   (its id is in the error) but the secondary call failed.
    pub async fn submit(
        &self,
        image: Option<Attachment>,
        document: Option<Attachment>,
    ) -> Result<SubmitReport, DiagnoseError> {
        // ── Step 1: Pre-flight checks (no state change) ──────────────────
        let image = ValidatedImage::try_from(image.ok_or(DiagnoseError::MissingImage)?)?;
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| {
            warn!("Submit rejected: another submission is in flight");
            DiagnoseError::Busy
        })?;

        let start = Instant::now();
        info!(
            "Submitting {}{}",
            image.attachment().file_name,
            document
                .as_ref()
                .map(|d| format!(" with document {}", d.file_name))
                .unwrap_or_default()
        );
        self.observer.on_submit_start(document.is_some());

        let mut added: Vec<RecordId> = Vec::with_capacity(2);
        let result = self.run(&image, document.as_ref(), &mut added).await;

        let duration_ms = millis(start.elapsed());
        self.observer.on_submit_complete(&added);
        match &result {
            Ok(_) => info!("Submission complete: {} record(s) in {}ms", added.len(), duration_ms),
            Err(e) => warn!("Submission ended with error after {}ms: {}", duration_ms, e),
        }

        result.map(|(retinal, table)| SubmitReport {
            retinal,
            table,
            duration_ms,
        })
    }

    async fn run(
        &self,
        image: &ValidatedImage,
        document: Option<&Attachment>,
        added: &mut Vec<RecordId>,
    ) -> Result<(RecordId, Option<RecordId>), DiagnoseError> {
        // ── Step 2: Primary call ─────────────────────────────────────────
        self.observer.on_call_start(ServiceKind::Predict);
        let prediction = match self.predictor.predict(image.attachment(), document).await {
            Ok(p) => p,
            Err(e) => {
                self.observer.on_call_failed(ServiceKind::Predict, &e);
                return Err(DiagnoseError::Predict(e));
            }
        };

        let retinal = self.commit(NewRecord::retinal(
            prediction.prediction,
            prediction.confidence,
            image.preview().cloned(),
        ));
        added.push(retinal);

        // ── Step 3: No document, done ────────────────────────────────────
        let Some(document) = document else {
            return Ok((retinal, None));
        };

        // ── Step 4: Secondary call ───────────────────────────────────────
        self.observer.on_call_start(ServiceKind::ExtractTable);
        let extraction = match self.extractor.extract_table(document).await {
            Ok(t) => t,
            Err(e) => {
                self.observer.on_call_failed(ServiceKind::ExtractTable, &e);
                return Err(DiagnoseError::TableExtraction {
                    retained: retinal,
                    source: e,
                });
            }
        };

        let table = self.commit(NewRecord::table(
            extraction.rows,
            extraction.prediction,
            extraction.confidence,
        ));
        added.push(table);

        Ok((retinal, Some(table)))
    }

    /// Append to the store and notify. The lock is released before the
    /// observer runs.
    fn commit(&self, record: NewRecord) -> RecordId {
        let rec = self.lock_store().append_record(record).clone();
        debug!("Committed {} record {}", rec.kind(), rec.id);
        self.observer.on_record_added(&rec);
        rec.id
    }

    /// Remove the record with `id`. `None` if there is no such record.
    pub fn clear(&self, id: RecordId) -> Option<DiagnosisRecord> {
        let removed = self.lock_store().remove(id);
        match &removed {
            Some(r) => info!("Cleared {} record {}", r.kind(), r.id),
            None => debug!("Clear: no record {}", id),
        }
        removed
    }

    /// Remove the record at `index` in the current order.
    pub fn clear_at(&self, index: usize) -> Option<DiagnosisRecord> {
        let removed = self.lock_store().remove_at(index);
        if let Some(ref r) = removed {
            info!("Cleared {} record {} at position {}", r.kind(), r.id, index);
        }
        removed
    }

    /// Snapshot of the records, oldest first.
    pub fn records(&self) -> Vec<DiagnosisRecord> {
        self.lock_store().records().to_vec()
    }

    pub fn record(&self, id: RecordId) -> Option<DiagnosisRecord> {
        self.lock_store().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_store().is_empty()
    }

    pub fn state(&self) -> OrchestratorState {
        if self.busy.load(Ordering::Acquire) {
            OrchestratorState::Submitting
        } else {
            OrchestratorState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state() == OrchestratorState::Submitting
    }

    // The store is never left half-updated, so a poisoned lock is still usable.
    fn lock_store(&self) -> MutexGuard<'_, DiagnosisStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
