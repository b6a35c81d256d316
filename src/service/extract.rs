//! Table-extraction client (the secondary call).
//!
//! `POST` multipart `document` and expect
//! `{ "table": [[...], ...], "diagnosis": { "prediction": "...", "confidence": 0.4 } }`.
//!
//! The two payload fields are optional: a missing `table` yields no rows and
//! a missing `diagnosis` yields an unknown prediction, rather than failing
//! the call. Only a non-2xx status, an `error` field or an unreadable body
//! count as failures.

use super::http::{self, HttpReply};
use super::{ExtractService, ServiceFuture, TableExtraction};
use crate::config::ServiceConfig;
use crate::error::{DiagnoseError, FailureKind, ServiceError, ServiceKind};
use crate::record::Confidence;
use crate::validate::Attachment;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const SERVICE: ServiceKind = ServiceKind::ExtractTable;

/// Response schema of the extraction endpoint.
#[derive(Debug, Deserialize)]
struct ExtractBody {
    #[serde(default)]
    table: Option<Value>,
    #[serde(default)]
    diagnosis: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// [`ExtractService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpExtractService {
    client: Client,
    url: String,
    document_field: String,
    timeout_secs: u64,
}

impl HttpExtractService {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DiagnoseError> {
        Ok(Self {
            client: http::build_client(SERVICE, config.extract_timeout_secs)?,
            url: config.extract_url.clone(),
            document_field: config.document_field.clone(),
            timeout_secs: config.extract_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    async fn call(&self, document: &Attachment) -> Result<TableExtraction, ServiceError> {
        info!(
            "Extract: POST {} (document {}, {} bytes)",
            self.url,
            document.file_name,
            document.len()
        );
        let form = Form::new().part(self.document_field.clone(), http::file_part(SERVICE, document)?);
        let reply = http::post_form(&self.client, &self.url, form, SERVICE, self.timeout_secs).await?;
        let result = interpret(&reply);
        match &result {
            Ok(t) => debug!("Extract: {} rows", t.rows.len()),
            Err(e) => warn!("Extract: failed: {}", e),
        }
        result
    }
}

impl ExtractService for HttpExtractService {
    fn extract_table<'a>(&'a self, document: &'a Attachment) -> ServiceFuture<'a, TableExtraction> {
        Box::pin(self.call(document))
    }
}

/// Apply the classification rule to an extraction reply.
fn interpret(reply: &HttpReply) -> Result<TableExtraction, ServiceError> {
    if !reply.status.is_success() {
        return Err(http::rejection(SERVICE, reply));
    }

    let body: ExtractBody = serde_json::from_slice(&reply.body).map_err(|e| http::malformed(SERVICE, e))?;

    if let Some(error) = http::text_from(body.error.as_ref()) {
        return Err(ServiceError::new(SERVICE, FailureKind::Refused, error));
    }

    let rows = body.table.map(table_rows).unwrap_or_default();
    let (prediction, confidence) = body.diagnosis.as_ref().map(diagnosis_fields).unwrap_or_default();

    Ok(TableExtraction {
        rows,
        prediction,
        confidence,
    })
}

/// `diagnosis` is normally an object whose fields degrade independently;
/// some deployments send a bare note instead.
fn diagnosis_fields(diagnosis: &Value) -> (Option<String>, Option<Confidence>) {
    match diagnosis {
        Value::Object(fields) => (
            http::text_from(fields.get("prediction")),
            http::confidence_from(fields.get("confidence")),
        ),
        note @ Value::String(_) => (http::text_from(Some(note)), None),
        other => {
            warn!("Extract: ignoring `diagnosis` of unexpected shape: {}", other);
            (None, None)
        }
    }
}

/// Rows of opaque text cells. Non-array rows are dropped.
fn table_rows(table: Value) -> Vec<Vec<String>> {
    let Value::Array(rows) = table else {
        warn!("Extract: `table` is not an array, treating as empty");
        return Vec::new();
    };

    rows.into_iter()
        .enumerate()
        .filter_map(|(i, row)| match row {
            Value::Array(cells) => Some(cells.into_iter().map(cell_text).collect()),
            _ => {
                warn!("Extract: skipping row {} (not an array)", i);
                None
            }
        })
        .collect()
}

/// Empty PDF cells arrive as `null`; they are kept as empty strings so rows
/// keep their column positions.
fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
