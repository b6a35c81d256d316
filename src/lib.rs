//! # heartscan
//!
//! Client-side orchestration of a two-stage retinal-scan diagnosis.
//!
//! A scan image (required) goes to an image-prediction backend. An optional
//! patient document goes to a table-extraction backend that returns the
//! extracted rows and a diagnosis derived from them. Every successful answer
//! becomes a [`DiagnosisRecord`] in one ordered list the caller can show and
//! prune.
//!
//! ## Submission Flow
//!
//! ```text
//! image (+ document)
//!  │
//!  ├─ 1. Validate  image encoding on the allow-list (png / jpeg)
//!  ├─ 2. Predict   POST image (+ document) → Retinal record
//!  ├─ 3. Extract   POST document → Table record   (only if 2 succeeded)
//!  └─ 4. Idle      ready for the next submission
//! ```
//!
//! A failed prediction stores nothing and skips extraction. A failed
//! extraction keeps the Retinal record and reports a table-specific error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heartscan::{Attachment, ServiceConfig, UploadOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoints from HEARTSCAN_PREDICT_URL / HEARTSCAN_EXTRACT_URL
//!     let config = ServiceConfig::from_env()?;
//!     let orchestrator = UploadOrchestrator::from_config(&config)?;
//!
//!     let image = Attachment::from_path("retina.png").await?;
//!     let report = orchestrator.submit(Some(image), None).await?;
//!     for record in orchestrator.records() {
//!         println!("{} {} {}", record.id, record.prediction_label(), record.confidence_label());
//!     }
//!     orchestrator.clear(report.retinal);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `heartscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! heartscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod record;
pub mod service;
pub mod store;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{DiagnoseError, FailureKind, ServiceError, ServiceKind, ValidationError};
pub use observer::{NoopObserver, ObserverHandle, SubmissionObserver};
pub use orchestrator::{OrchestratorState, SubmitReport, UploadOrchestrator};
pub use record::{Confidence, DiagnosisRecord, NewRecord, PreviewRef, RecordDetails, RecordId, RecordKind};
pub use service::{
    ExtractService, HttpExtractService, HttpPredictService, PredictService, Prediction, ServiceFuture,
    TableExtraction,
};
pub use store::DiagnosisStore;
pub use validate::{validate_image, Attachment, ImageCheck, ValidatedImage};
