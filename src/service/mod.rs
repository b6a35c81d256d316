//! Backend service clients.
//!
//! Each backend sits behind a small trait so the orchestrator can be driven
//! by the real HTTP clients or by scripted fakes in tests:
//!
//! ```text
//!            ┌─────────────────┐   multipart: image (+ document)
//! submit ──▶ │ PredictService  │ ─────────────────────────────▶ /predict
//!            └─────────────────┘
//!            ┌─────────────────┐   multipart: document
//!        ──▶ │ ExtractService  │ ─────────────────────────────▶ /extract-table
//!            └─────────────────┘
//! ```
//!
//! 1. [`predict`]: the primary call, [`HttpPredictService`]
//! 2. [`extract`]: the secondary call, [`HttpExtractService`]
//! 3. [`http`]:    multipart building, transport error mapping and the
//!    failure classification rule shared by both
//!
//! Neither client retries. A failed call is returned as a
//! [`ServiceError`] and the orchestrator decides what happens next.

pub mod extract;
pub mod http;
pub mod predict;

pub use extract::HttpExtractService;
pub use predict::HttpPredictService;

use crate::error::ServiceError;
use crate::record::Confidence;
use crate::validate::Attachment;
use futures::future::BoxFuture;

/// Boxed `Send` future returned by the service traits.
pub type ServiceFuture<'a, T> = BoxFuture<'a, Result<T, ServiceError>>;

/// A successful prediction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Prediction {
    pub prediction: Option<String>,
    pub confidence: Option<Confidence>,
}

/// A successful table extraction, with the diagnosis derived from the table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableExtraction {
    pub rows: Vec<Vec<String>>,
    pub prediction: Option<String>,
    pub confidence: Option<Confidence>,
}

/// The image-prediction backend (primary call).
pub trait PredictService: Send + Sync {
    fn predict<'a>(
        &'a self,
        image: &'a Attachment,
        document: Option<&'a Attachment>,
    ) -> ServiceFuture<'a, Prediction>;
}

/// The document table-extraction backend (secondary call).
pub trait ExtractService: Send + Sync {
    fn extract_table<'a>(&'a self, document: &'a Attachment) -> ServiceFuture<'a, TableExtraction>;
}
