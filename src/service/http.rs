//! HTTP plumbing shared by both backend clients.
//!
//! The classification rule lives here so both clients apply it the same way:
//!
//! | Outcome                                   | [`FailureKind`]       |
//! |-------------------------------------------|-----------------------|
//! | no response, connection error             | `Unreachable`         |
//! | no response within the per-call timeout   | `Timeout`             |
//! | non-2xx status                            | `Rejected { status }` |
//! | 2xx body that is not the expected JSON    | `MalformedResponse`   |
//! | 2xx body refusing the request             | `Refused` (per client)|
//!
//! The user-facing message is the body's `error` (or `message`) field when
//! there is one, else a generic fallback.

use crate::error::{DiagnoseError, FailureKind, ServiceError, ServiceKind};
use crate::record::Confidence;
use crate::validate::Attachment;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Status and raw body of a backend response.
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// One client per service, so each carries its own timeout.
pub fn build_client(service: ServiceKind, timeout_secs: u64) -> Result<Client, DiagnoseError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("heartscan/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DiagnoseError::Internal(format!("Failed to build HTTP client for the {service}: {e}")))
}

/// A multipart file part for `file`.
pub fn file_part(service: ServiceKind, file: &Attachment) -> Result<Part, ServiceError> {
    let mime = if file.mime_type.trim().is_empty() {
        "application/octet-stream"
    } else {
        file.mime_type.as_str()
    };
    Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(mime)
        .map_err(|e| {
            ServiceError::new(
                service,
                FailureKind::InvalidRequest,
                format!("Cannot send '{}' with MIME type '{}': {e}", file.file_name, file.mime_type),
            )
        })
}

/// POST `form` and read the whole body.
pub async fn post_form(
    client: &Client,
    url: &str,
    form: Form,
    service: ServiceKind,
    timeout_secs: u64,
) -> Result<HttpReply, ServiceError> {
    let start = Instant::now();
    let response = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| transport_error(service, &e, timeout_secs))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| transport_error(service, &e, timeout_secs))?
        .to_vec();

    debug!(
        "{}: HTTP {} ({} bytes) in {}ms",
        service,
        status.as_u16(),
        body.len(),
        start.elapsed().as_millis()
    );
    Ok(HttpReply { status, body })
}

fn transport_error(service: ServiceKind, e: &reqwest::Error, timeout_secs: u64) -> ServiceError {
    if e.is_timeout() {
        ServiceError::timeout(service, timeout_secs)
    } else if e.is_builder() {
        ServiceError::new(service, FailureKind::InvalidRequest, format!("Invalid request: {e}"))
    } else {
        ServiceError::unreachable(service, e)
    }
}

/// Failure for a non-2xx reply.
pub fn rejection(service: ServiceKind, reply: &HttpReply) -> ServiceError {
    let status = reply.status.as_u16();
    let message = error_message(&reply.body).unwrap_or_else(|| format!("Unknown error (HTTP {status})"));
    ServiceError::new(service, FailureKind::Rejected { status }, message)
}

/// Failure for a 2xx reply whose body could not be decoded.
pub fn malformed(service: ServiceKind, detail: impl std::fmt::Display) -> ServiceError {
    ServiceError::new(
        service,
        FailureKind::MalformedResponse,
        format!("The {service} returned an unreadable response: {detail}"),
    )
}

/// The structured error text of a JSON body, if it has one.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A non-empty trimmed string, or `None`.
pub fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Text from a JSON string; any other shape is unknown.
pub fn text_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(Some(s.clone())),
        _ => None,
    }
}

/// Confidence from a JSON number or numeric string; anything else is unknown.
pub fn confidence_from(value: Option<&Value>) -> Option<Confidence> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Confidence::new(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(
            error_message(br#"{"error":"corrupt file","message":"other"}"#).as_deref(),
            Some("corrupt file")
        );
        assert_eq!(error_message(br#"{"message":"bad input"}"#).as_deref(), Some("bad input"));
    }

    #[test]
    fn error_message_absent_or_blank() {
        assert!(error_message(br#"{"success":false}"#).is_none());
        assert!(error_message(br#"{"error":"   "}"#).is_none());
        assert!(error_message(br#"{"error":42}"#).is_none());
        assert!(error_message(b"<html>502</html>").is_none());
    }

    #[test]
    fn rejection_uses_structured_error() {
        let e = rejection(ServiceKind::ExtractTable, &reply(400, r#"{"error":"No table found in the PDF"}"#));
        assert_eq!(e.message, "No table found in the PDF");
        assert_eq!(e.status(), Some(400));
        assert_eq!(e.service, ServiceKind::ExtractTable);
    }

    #[test]
    fn rejection_falls_back_to_generic() {
        let e = rejection(ServiceKind::Predict, &reply(502, "Bad Gateway"));
        assert_eq!(e.message, "Unknown error (HTTP 502)");
    }

    #[test]
    fn confidence_from_numbers_and_strings() {
        assert_eq!(confidence_from(Some(&json!(0.87))).map(Confidence::value), Some(0.87));
        assert_eq!(confidence_from(Some(&json!(1))).map(Confidence::value), Some(1.0));
        assert_eq!(confidence_from(Some(&json!("0.25"))).map(Confidence::value), Some(0.25));
    }

    #[test]
    fn confidence_from_unusable_is_unknown() {
        assert!(confidence_from(None).is_none());
        assert!(confidence_from(Some(&json!(null))).is_none());
        assert!(confidence_from(Some(&json!(87))).is_none());
        assert!(confidence_from(Some(&json!(-0.2))).is_none());
        assert!(confidence_from(Some(&json!("high"))).is_none());
        assert!(confidence_from(Some(&json!([0.5]))).is_none());
    }

    #[test]
    fn text_from_strings_only() {
        assert_eq!(text_from(Some(&json!(" Positive "))).as_deref(), Some("Positive"));
        assert!(text_from(Some(&json!(1))).is_none());
        assert!(text_from(Some(&json!({"label": "Positive"}))).is_none());
        assert!(text_from(Some(&json!(""))).is_none());
        assert!(text_from(None).is_none());
    }

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty(Some("  Positive ".into())).as_deref(), Some("Positive"));
        assert!(non_empty(Some("  ".into())).is_none());
        assert!(non_empty(None).is_none());
    }

    #[test]
    fn file_part_rejects_bad_mime() {
        let file = Attachment::new("x", "not a mime", vec![1]);
        let err = file_part(ServiceKind::Predict, &file).unwrap_err();
        assert_eq!(err.failure, FailureKind::InvalidRequest);
    }

    #[test]
    fn file_part_defaults_empty_mime() {
        let file = Attachment::new("x.pdf", "", vec![1]);
        assert!(file_part(ServiceKind::ExtractTable, &file).is_ok());
    }
}
