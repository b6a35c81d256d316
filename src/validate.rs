//! Upload inputs and the image validator.
//!
//! Images are checked against a closed allow-list of encodings at selection
//! time, before a submission is even possible. Documents are passed through
//! untouched; their contents are the extraction backend's concern.
//!
//! When an [`Attachment`] is read from disk the declared MIME type is sniffed
//! from the file's magic bytes. Only documents fall back to the extension,
//! so a PNG renamed to `.txt` is still recognised and a text file renamed to
//! `.png` is not.

use crate::error::{DiagnoseError, ValidationError};
use crate::record::PreviewRef;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Image encodings the prediction backend accepts.
pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];

/// Message shown when an image is rejected.
pub const INVALID_IMAGE_REASON: &str = "Please upload a valid image file (PNG, JPG, JPEG).";

const PDF_MIME: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";

/// A file selected for upload, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Caller-owned preview handle. Only meaningful for images.
    pub preview: Option<PreviewRef>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("preview", &self.preview)
            .finish()
    }
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            preview: None,
        }
    }

    /// Read a file and sniff its MIME type.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DiagnoseError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DiagnoseError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;
        let mime_type = sniff_mime(&bytes, path).to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        debug!("Loaded {} ({}, {} bytes)", path.display(), mime_type, bytes.len());
        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn with_preview(mut self, preview: PreviewRef) -> Self {
        self.preview = Some(preview);
        self
    }

    /// `data:<mime>;base64,<...>` rendering of the bytes, usable as a preview.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Outcome of [`validate_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCheck {
    Accepted,
    Rejected { reason: String },
}

impl ImageCheck {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ImageCheck::Accepted)
    }
}

/// Pure predicate: is this attachment an accepted image encoding?
///
/// Compares the declared MIME type, ignoring ASCII case and `;` parameters.
pub fn validate_image(file: &Attachment) -> ImageCheck {
    let essence = file
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    if ACCEPTED_IMAGE_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(essence))
    {
        ImageCheck::Accepted
    } else {
        ImageCheck::Rejected {
            reason: INVALID_IMAGE_REASON.to_string(),
        }
    }
}

/// An image that passed [`validate_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage(Attachment);

impl ValidatedImage {
    pub fn attachment(&self) -> &Attachment {
        &self.0
    }

    pub fn preview(&self) -> Option<&PreviewRef> {
        self.0.preview.as_ref()
    }

    pub fn into_inner(self) -> Attachment {
        self.0
    }
}

impl TryFrom<Attachment> for ValidatedImage {
    type Error = ValidationError;

    fn try_from(file: Attachment) -> Result<Self, Self::Error> {
        match validate_image(&file) {
            ImageCheck::Accepted => Ok(Self(file)),
            ImageCheck::Rejected { reason } => Err(ValidationError {
                mime_type: file.mime_type,
                reason,
            }),
        }
    }
}

/// Best-effort MIME type from magic bytes, then (for documents) extension.
pub fn sniff_mime(bytes: &[u8], path: &Path) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        return PDF_MIME;
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => return "image/png",
        Ok(ImageFormat::Jpeg) => return "image/jpeg",
        Ok(other) => return other.to_mime_type(),
        Err(_) => {}
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    // Image extensions are not trusted: an image must carry its magic bytes.
    match ext.as_str() {
        "pdf" => PDF_MIME,
        _ => OCTET_STREAM,
    }
}
