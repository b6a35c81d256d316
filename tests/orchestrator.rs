//! Orchestrator behaviour through the public API, with in-process fake
//! backends standing in for the HTTP services.

use heartscan::{
    Attachment, Confidence, DiagnoseError, ExtractService, FailureKind, PredictService, Prediction,
    PreviewRef, RecordKind, ServiceError, ServiceFuture, ServiceKind, SubmissionObserver,
    TableExtraction, UploadOrchestrator, DiagnosisRecord, RecordId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn png(name: &str) -> Attachment {
    Attachment::new(name, "image/png", b"\x89PNG\r\n\x1a\n....".to_vec())
}

fn pdf() -> Attachment {
    Attachment::new("labs.pdf", "application/pdf", b"%PDF-1.7 ...".to_vec())
}

/// Answers every call with the same outcome.
struct StaticPredictor {
    outcome: Result<Prediction, ServiceError>,
    calls: AtomicUsize,
}

impl StaticPredictor {
    fn ok(prediction: &str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(Prediction {
                prediction: Some(prediction.to_string()),
                confidence: Confidence::new(confidence),
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        })
    }
}

impl PredictService for StaticPredictor {
    fn predict<'a>(&'a self, _image: &'a Attachment, _document: Option<&'a Attachment>) -> ServiceFuture<'a, Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

struct StaticExtractor {
    outcome: Result<TableExtraction, ServiceError>,
    calls: AtomicUsize,
}

impl StaticExtractor {
    fn ok(rows: Vec<Vec<&str>>, prediction: Option<&str>, confidence: Option<f64>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(TableExtraction {
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(String::from).collect())
                    .collect(),
                prediction: prediction.map(String::from),
                confidence: confidence.and_then(Confidence::new),
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            calls: AtomicUsize::new(0),
        })
    }
}

impl ExtractService for StaticExtractor {
    fn extract_table<'a>(&'a self, _document: &'a Attachment) -> ServiceFuture<'a, TableExtraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

/// Blocks inside `predict` until released, so a second submit can race it.
struct GatedPredictor {
    started: Notify,
    release: Notify,
}

impl PredictService for GatedPredictor {
    fn predict<'a>(&'a self, _image: &'a Attachment, _document: Option<&'a Attachment>) -> ServiceFuture<'a, Prediction> {
        Box::pin(async move {
            self.started.notify_one();
            self.release.notified().await;
            Ok(Prediction {
                prediction: Some("Negative".into()),
                confidence: Confidence::new(0.5),
            })
        })
    }
}

/// Records the observer callbacks as plain strings.
#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl SubmissionObserver for EventLog {
    fn on_submit_start(&self, has_document: bool) {
        self.push(format!("start document={has_document}"));
    }
    fn on_call_start(&self, service: ServiceKind) {
        self.push(format!("call {service}"));
    }
    fn on_record_added(&self, record: &DiagnosisRecord) {
        self.push(format!("added {}", record.kind()));
    }
    fn on_call_failed(&self, service: ServiceKind, _error: &ServiceError) {
        self.push(format!("failed {service}"));
    }
    fn on_submit_complete(&self, records_added: &[RecordId]) {
        self.push(format!("complete {}", records_added.len()));
    }
}

// ── Submission outcomes ──────────────────────────────────────────────────────

#[tokio::test]
async fn image_only_adds_one_retinal_record() {
    let extractor = StaticExtractor::ok(vec![], None, None);
    let orch = UploadOrchestrator::new(StaticPredictor::ok("Positive", 0.87), extractor.clone());

    let report = assert_ok!(orch.submit(Some(png("scan.png")), None).await);
    assert!(report.table.is_none());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

    let records = orch.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind(), RecordKind::Retinal);
    assert_eq!(records[0].prediction_label(), "Positive");
    assert_eq!(records[0].confidence_label(), "87.00%");
}

#[tokio::test]
async fn image_and_document_add_retinal_then_table() {
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Positive", 0.87),
        StaticExtractor::ok(vec![vec!["Age", "54"], vec!["BP", "140/90"]], Some("High risk"), Some(0.72)),
    );

    let report = assert_ok!(orch.submit(Some(png("scan.png")), Some(pdf())).await);
    assert_eq!(report.record_ids().len(), 2);

    let records = orch.records();
    assert_eq!(records[0].id, report.retinal);
    assert_eq!(records[0].kind(), RecordKind::Retinal);
    assert_eq!(Some(records[1].id), report.table);
    assert_eq!(records[1].kind(), RecordKind::Table);
    assert_eq!(records[1].table_rows().map(|r| r.len()), Some(2));
    assert_eq!(records[1].prediction_label(), "High risk");
    assert_eq!(records[1].confidence_label(), "72.00%");
}

#[tokio::test]
async fn prediction_refusal_stores_nothing_and_skips_extraction() {
    let extractor = StaticExtractor::ok(vec![vec!["a"]], None, None);
    let orch = UploadOrchestrator::new(
        StaticPredictor::failing(ServiceError::new(ServiceKind::Predict, FailureKind::Refused, "corrupt file")),
        extractor.clone(),
    );

    let err = assert_err!(orch.submit(Some(png("scan.png")), Some(pdf())).await);
    match &err {
        DiagnoseError::Predict(e) => assert_eq!(e.message, "corrupt file"),
        other => panic!("expected Predict, got {other:?}"),
    }
    assert!(err.to_string().contains("corrupt file"));
    assert!(orch.is_empty());
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn extraction_failure_keeps_retinal_record() {
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Negative", 0.4),
        StaticExtractor::failing(ServiceError::new(
            ServiceKind::ExtractTable,
            FailureKind::Rejected { status: 400 },
            "No table found in the PDF",
        )),
    );

    let err = assert_err!(orch.submit(Some(png("scan.png")), Some(pdf())).await);
    assert!(err.is_partial());
    let retained = match err {
        DiagnoseError::TableExtraction { retained, ref source } => {
            assert_eq!(source.status(), Some(400));
            retained
        }
        other => panic!("expected TableExtraction, got {other:?}"),
    };

    let records = orch.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, retained);
    assert_eq!(records[0].kind(), RecordKind::Retinal);
}

#[tokio::test]
async fn corrupt_document_surfaces_backend_message() {
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Positive", 0.87),
        StaticExtractor::failing(ServiceError::new(ServiceKind::ExtractTable, FailureKind::Refused, "corrupt file")),
    );

    let err = assert_err!(orch.submit(Some(png("scan.png")), Some(pdf())).await);
    assert_eq!(err.service_error().map(|e| e.message.as_str()), Some("corrupt file"));
    assert!(err.to_string().contains("corrupt file"));

    let records = orch.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind(), RecordKind::Retinal);
    assert_eq!(records[0].prediction_label(), "Positive");
}

#[tokio::test]
async fn missing_or_invalid_image_makes_no_call() {
    let predictor = StaticPredictor::ok("Positive", 0.9);
    let orch = UploadOrchestrator::new(predictor.clone(), StaticExtractor::ok(vec![], None, None));

    let err = assert_err!(orch.submit(None, Some(pdf())).await);
    assert!(matches!(err, DiagnoseError::MissingImage));

    let gif = Attachment::new("scan.gif", "image/gif", b"GIF89a".to_vec());
    let err = assert_err!(orch.submit(Some(gif), None).await);
    assert!(matches!(err, DiagnoseError::Validation(_)));
    assert_eq!(err.to_string(), heartscan::validate::INVALID_IMAGE_REASON);

    assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    assert!(orch.is_empty());
}

#[tokio::test]
async fn identical_submissions_get_distinct_ids() {
    let orch = UploadOrchestrator::new(StaticPredictor::ok("Positive", 0.87), StaticExtractor::ok(vec![], None, None));

    let first = assert_ok!(orch.submit(Some(png("scan.png")), None).await);
    let second = assert_ok!(orch.submit(Some(png("scan.png")), None).await);
    assert_ne!(first.retinal, second.retinal);
    assert_eq!(orch.len(), 2);
}

#[tokio::test]
async fn out_of_range_confidence_shows_not_available() {
    let predictor = Arc::new(StaticPredictorRaw(Prediction {
        prediction: Some("Positive".into()),
        confidence: Confidence::new(1.7),
    }));
    let orch = UploadOrchestrator::new(predictor, StaticExtractor::ok(vec![], None, None));

    assert_ok!(orch.submit(Some(png("scan.png")), None).await);
    assert_eq!(orch.records()[0].confidence_label(), "N/A");
}

struct StaticPredictorRaw(Prediction);

impl PredictService for StaticPredictorRaw {
    fn predict<'a>(&'a self, _image: &'a Attachment, _document: Option<&'a Attachment>) -> ServiceFuture<'a, Prediction> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

#[tokio::test]
async fn preview_travels_with_retinal_record_only() {
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Positive", 0.87),
        StaticExtractor::ok(vec![vec!["x"]], None, None),
    );
    let image = png("scan.png").with_preview(PreviewRef::new("blob:scan-1"));

    assert_ok!(orch.submit(Some(image), Some(pdf())).await);
    let records = orch.records();
    assert_eq!(records[0].preview.as_ref().map(|p| p.as_str()), Some("blob:scan-1"));
    assert!(records[1].preview.is_none());
}

// ── Single-flight ────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_submit_is_rejected_as_busy() {
    let gate = Arc::new(GatedPredictor {
        started: Notify::new(),
        release: Notify::new(),
    });
    let extractor = StaticExtractor::ok(vec![], None, None);
    let orch = Arc::new(UploadOrchestrator::new(gate.clone(), extractor));

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(Some(png("a.png")), None).await })
    };

    gate.started.notified().await;
    assert!(orch.is_busy());

    let err = assert_err!(orch.submit(Some(png("b.png")), None).await);
    assert!(matches!(err, DiagnoseError::Busy));

    gate.release.notify_one();
    let report = assert_ok!(first.await.expect("task panicked"));
    assert_eq!(orch.len(), 1);
    assert_eq!(orch.records()[0].id, report.retinal);
    assert!(!orch.is_busy());

    // Idle again: the next submission goes through.
    gate.release.notify_one();
    assert_ok!(orch.submit(Some(png("c.png")), None).await);
    assert_eq!(orch.len(), 2);
}

// ── Clearing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn clear_removes_only_target_and_keeps_order() {
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Positive", 0.87),
        StaticExtractor::ok(vec![vec!["a"]], None, None),
    );
    let r1 = assert_ok!(orch.submit(Some(png("1.png")), Some(pdf())).await);
    let r2 = assert_ok!(orch.submit(Some(png("2.png")), None).await);
    let ids: Vec<_> = orch.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![r1.retinal, r1.table.unwrap(), r2.retinal]);

    let removed = orch.clear(r1.table.unwrap()).expect("present");
    assert_eq!(removed.kind(), RecordKind::Table);
    let ids: Vec<_> = orch.records().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![r1.retinal, r2.retinal]);

    // Unknown id: no-op.
    assert!(orch.clear(r1.table.unwrap()).is_none());
    assert_eq!(orch.len(), 2);

    assert_eq!(orch.clear_at(0).map(|r| r.id), Some(r1.retinal));
    assert_eq!(orch.records()[0].id, r2.retinal);
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_calls_records_and_failures_in_order() {
    let log = Arc::new(EventLog::default());
    let orch = UploadOrchestrator::new(
        StaticPredictor::ok("Positive", 0.87),
        StaticExtractor::failing(ServiceError::unreachable(ServiceKind::ExtractTable, "connection refused")),
    )
    .with_observer(log.clone());

    assert_err!(orch.submit(Some(png("scan.png")), Some(pdf())).await);
    assert_eq!(
        log.events(),
        vec![
            "start document=true",
            "call prediction service",
            "added retinal",
            "call table extraction service",
            "failed table extraction service",
            "complete 1",
        ]
    );
}
