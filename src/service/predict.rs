//! Image-prediction client (the primary call).
//!
//! `POST` multipart `image` (+ optional `document`) and expect
//! `{ "success": true, "prediction": "...", "confidence": 0.87 }`.
//! Anything else is a failure: a non-2xx status, a body with `success`
//! false or missing, or a body carrying an `error`.

use super::http::{self, HttpReply};
use super::{PredictService, Prediction, ServiceFuture};
use crate::config::ServiceConfig;
use crate::error::{DiagnoseError, FailureKind, ServiceError, ServiceKind};
use crate::validate::Attachment;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE: ServiceKind = ServiceKind::Predict;

/// Message for a 2xx body that declined to diagnose without saying why.
pub const REFUSED_FALLBACK: &str = "Unable to diagnose. Please try again.";

/// Response schema of the prediction endpoint.
#[derive(Debug, Deserialize)]
struct PredictBody {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    prediction: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// [`PredictService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPredictService {
    client: Client,
    url: String,
    image_field: String,
    document_field: String,
    timeout_secs: u64,
}

impl HttpPredictService {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DiagnoseError> {
        Ok(Self {
            client: http::build_client(SERVICE, config.predict_timeout_secs)?,
            url: config.predict_url.clone(),
            image_field: config.image_field.clone(),
            document_field: config.document_field.clone(),
            timeout_secs: config.predict_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    fn build_form(&self, image: &Attachment, document: Option<&Attachment>) -> Result<Form, ServiceError> {
        let mut form = Form::new().part(self.image_field.clone(), http::file_part(SERVICE, image)?);
        if let Some(doc) = document {
            form = form.part(self.document_field.clone(), http::file_part(SERVICE, doc)?);
        }
        Ok(form)
    }

    async fn call(&self, image: &Attachment, document: Option<&Attachment>) -> Result<Prediction, ServiceError> {
        info!(
            "Predict: POST {} (image {}, {} bytes{})",
            self.url,
            image.file_name,
            image.len(),
            if document.is_some() { ", with document" } else { "" }
        );
        let form = self.build_form(image, document)?;
        let reply = http::post_form(&self.client, &self.url, form, SERVICE, self.timeout_secs).await?;
        let result = interpret(&reply);
        if let Err(ref e) = result {
            warn!("Predict: failed: {}", e);
        }
        result
    }
}

impl PredictService for HttpPredictService {
    fn predict<'a>(
        &'a self,
        image: &'a Attachment,
        document: Option<&'a Attachment>,
    ) -> ServiceFuture<'a, Prediction> {
        Box::pin(self.call(image, document))
    }
}

/// Apply the classification rule to a prediction reply.
fn interpret(reply: &HttpReply) -> Result<Prediction, ServiceError> {
    if !reply.status.is_success() {
        return Err(http::rejection(SERVICE, reply));
    }

    let body: PredictBody = serde_json::from_slice(&reply.body).map_err(|e| http::malformed(SERVICE, e))?;

    if let Some(error) = http::text_from(body.error.as_ref()) {
        return Err(ServiceError::new(SERVICE, FailureKind::Refused, error));
    }
    if body.success != Some(Value::Bool(true)) {
        return Err(ServiceError::new(SERVICE, FailureKind::Refused, REFUSED_FALLBACK));
    }

    Ok(Prediction {
        prediction: http::text_from(body.prediction.as_ref()),
        confidence: http::confidence_from(body.confidence.as_ref()),
    })
}
