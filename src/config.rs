//! Service configuration.
//!
//! Where the two backends live, how long each call may take and which
//! multipart field names they expect are all set through [`ServiceConfig`],
//! built via its [`ServiceConfigBuilder`]. The prediction service and the
//! table-extraction service are configured independently: they are commonly
//! hosted in different places (a remote GPU box vs. a local helper).

use crate::error::DiagnoseError;
use crate::observer::ObserverHandle;
use reqwest::Url;
use std::fmt;

/// Default prediction endpoint.
pub const DEFAULT_PREDICT_URL: &str = "http://localhost:8000/predict";
/// Default table-extraction endpoint.
pub const DEFAULT_EXTRACT_URL: &str = "http://localhost:5000/extract-table";

pub const ENV_PREDICT_URL: &str = "HEARTSCAN_PREDICT_URL";
pub const ENV_EXTRACT_URL: &str = "HEARTSCAN_EXTRACT_URL";
pub const ENV_PREDICT_TIMEOUT: &str = "HEARTSCAN_PREDICT_TIMEOUT";
pub const ENV_EXTRACT_TIMEOUT: &str = "HEARTSCAN_EXTRACT_TIMEOUT";

/// Configuration for the two backend clients.
///
/// # Example
/// ```rust
/// use heartscan::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .predict_url("https://gpu.example.org/predict")
///     .extract_url("http://localhost:5000/extract-table")
///     .predict_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.extract_timeout_secs, 60);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Image prediction endpoint. Default: [`DEFAULT_PREDICT_URL`].
    pub predict_url: String,

    /// Table-extraction endpoint. Default: [`DEFAULT_EXTRACT_URL`].
    pub extract_url: String,

    /// Per-call timeout for the prediction request, in seconds. Default: 60.
    ///
    /// Model inference on a cold backend can take tens of seconds; the
    /// timeout only bounds a single call and expiring it is reported as a
    /// prediction failure.
    pub predict_timeout_secs: u64,

    /// Per-call timeout for the table-extraction request, in seconds. Default: 60.
    pub extract_timeout_secs: u64,

    /// Multipart field carrying the image. Default: `image`.
    pub image_field: String,

    /// Multipart field carrying the document, on both endpoints. Default: `document`.
    pub document_field: String,

    /// Receives submission events. Default: none.
    pub observer: Option<ObserverHandle>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            predict_url: DEFAULT_PREDICT_URL.to_string(),
            extract_url: DEFAULT_EXTRACT_URL.to_string(),
            predict_timeout_secs: 60,
            extract_timeout_secs: 60,
            image_field: "image".to_string(),
            document_field: "document".to_string(),
            observer: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("predict_url", &self.predict_url)
            .field("extract_url", &self.extract_url)
            .field("predict_timeout_secs", &self.predict_timeout_secs)
            .field("extract_timeout_secs", &self.extract_timeout_secs)
            .field("image_field", &self.image_field)
            .field("document_field", &self.document_field)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SubmissionObserver>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden by `HEARTSCAN_*` environment variables.
    ///
    /// Empty variables are ignored; unparsable timeouts are a config error.
    pub fn from_env() -> Result<Self, DiagnoseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DiagnoseError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(url) = get(ENV_PREDICT_URL) {
            builder = builder.predict_url(url);
        }
        if let Some(url) = get(ENV_EXTRACT_URL) {
            builder = builder.extract_url(url);
        }
        if let Some(secs) = get(ENV_PREDICT_TIMEOUT) {
            builder = builder.predict_timeout_secs(parse_secs(ENV_PREDICT_TIMEOUT, &secs)?);
        }
        if let Some(secs) = get(ENV_EXTRACT_TIMEOUT) {
            builder = builder.extract_timeout_secs(parse_secs(ENV_EXTRACT_TIMEOUT, &secs)?);
        }

        builder.build()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, DiagnoseError> {
    value.trim().parse().map_err(|_| {
        DiagnoseError::InvalidConfig(format!("{key} must be a whole number of seconds, got '{value}'"))
    })
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn predict_url(mut self, url: impl Into<String>) -> Self {
        self.config.predict_url = url.into();
        self
    }

    pub fn extract_url(mut self, url: impl Into<String>) -> Self {
        self.config.extract_url = url.into();
        self
    }

    pub fn predict_timeout_secs(mut self, secs: u64) -> Self {
        self.config.predict_timeout_secs = secs.max(1);
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs.max(1);
        self
    }

    pub fn image_field(mut self, name: impl Into<String>) -> Self {
        self.config.image_field = name.into();
        self
    }

    pub fn document_field(mut self, name: impl Into<String>) -> Self {
        self.config.document_field = name.into();
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DiagnoseError> {
        let c = &self.config;
        check_endpoint("predict_url", &c.predict_url)?;
        check_endpoint("extract_url", &c.extract_url)?;
        if c.image_field.trim().is_empty() || c.document_field.trim().is_empty() {
            return Err(DiagnoseError::InvalidConfig(
                "Multipart field names must not be empty".into(),
            ));
        }
        if c.image_field == c.document_field {
            return Err(DiagnoseError::InvalidConfig(format!(
                "Image and document fields must differ, both are '{}'",
                c.image_field
            )));
        }
        Ok(self.config)
    }
}

fn check_endpoint(name: &str, url: &str) -> Result<(), DiagnoseError> {
    let parsed = Url::parse(url)
        .map_err(|e| DiagnoseError::InvalidConfig(format!("{name} '{url}' is not a valid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DiagnoseError::InvalidConfig(format!(
            "{name} must be an HTTP/HTTPS URL, got scheme '{other}'"
        ))),
    }
}
