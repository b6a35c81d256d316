//! Result records produced by a successful backend call.
//!
//! A [`DiagnosisRecord`] is created only inside
//! [`crate::UploadOrchestrator::submit`], from a successful prediction or
//! table-extraction response, and lives until the user clears it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a record. Assigned once by the store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which backend produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Image prediction (primary call).
    Retinal,
    /// Document table extraction (secondary call).
    Table,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Retinal => f.write_str("retinal"),
            RecordKind::Table => f.write_str("table"),
        }
    }
}

/// A model confidence known to lie in `[0, 1]`.
///
/// There is deliberately no way to build one from an out-of-range or
/// non-finite value; such values stay `None` ("unknown") in the record.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// `Some` only for finite values in `[0, 1]`.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && (0.0..=1.0).contains(&value)).then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Percentage with two decimals, e.g. `87.00%`.
    pub fn percent(self) -> String {
        format!("{:.2}%", self.0 * 100.0)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = f64::deserialize(deserializer)?;
        Confidence::new(v)
            .ok_or_else(|| serde::de::Error::custom(format!("confidence {v} is outside [0, 1]")))
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.percent())
    }
}

/// Caller-owned handle to a locally rendered preview of the submitted image
/// (an object URL, a file path, a data URI, ...). Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind-specific payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordDetails {
    Retinal,
    /// Extracted rows, in document order. Rows may be ragged.
    Table { rows: Vec<Vec<String>> },
}

/// One diagnosis result, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: RecordId,
    /// Predicted label; absent when the backend sent none.
    pub prediction: Option<String>,
    /// `None` means unknown, never zero.
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preview: Option<PreviewRef>,
    #[serde(flatten)]
    pub details: RecordDetails,
}

impl DiagnosisRecord {
    pub fn kind(&self) -> RecordKind {
        match self.details {
            RecordDetails::Retinal => RecordKind::Retinal,
            RecordDetails::Table { .. } => RecordKind::Table,
        }
    }

    /// Extracted table rows; `None` for Retinal records.
    pub fn table_rows(&self) -> Option<&[Vec<String>]> {
        match &self.details {
            RecordDetails::Table { rows } => Some(rows),
            RecordDetails::Retinal => None,
        }
    }

    /// Confidence for display: `87.00%` or `N/A`.
    pub fn confidence_label(&self) -> String {
        self.confidence
            .map(Confidence::percent)
            .unwrap_or_else(|| "N/A".to_string())
    }

    /// Prediction for display: the label or `N/A`.
    pub fn prediction_label(&self) -> &str {
        self.prediction.as_deref().unwrap_or("N/A")
    }
}

/// A record before the store has given it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub prediction: Option<String>,
    pub confidence: Option<Confidence>,
    pub preview: Option<PreviewRef>,
    pub details: RecordDetails,
}

impl NewRecord {
    pub fn retinal(
        prediction: Option<String>,
        confidence: Option<Confidence>,
        preview: Option<PreviewRef>,
    ) -> Self {
        Self {
            prediction,
            confidence,
            preview,
            details: RecordDetails::Retinal,
        }
    }

    pub fn table(
        rows: Vec<Vec<String>>,
        prediction: Option<String>,
        confidence: Option<Confidence>,
    ) -> Self {
        Self {
            prediction,
            confidence,
            preview: None,
            details: RecordDetails::Table { rows },
        }
    }

    pub(crate) fn into_record(self, id: RecordId) -> DiagnosisRecord {
        DiagnosisRecord {
            id,
            prediction: self.prediction,
            confidence: self.confidence,
            preview: self.preview,
            details: self.details,
        }
    }
}
