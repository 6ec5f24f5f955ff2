//! Envelope format selection from the inbound `Content-Type`.

use crate::batch::BatchError;

/// Envelope format of a batch. The response always mirrors the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeFormat {
    /// `multipart/mixed` with the inbound boundary.
    Multipart { boundary: String },
    /// `application/json`.
    Json,
}

impl EnvelopeFormat {
    /// Pick the format for an inbound content type.
    pub fn from_content_type(content_type: &str) -> Result<Self, BatchError> {
        if content_type.starts_with("multipart/mixed") {
            let boundary = parse_boundary(content_type).ok_or(BatchError::MissingBoundary)?;
            Ok(EnvelopeFormat::Multipart { boundary })
        } else if content_type.starts_with("application/json") {
            Ok(EnvelopeFormat::Json)
        } else {
            Err(BatchError::UnsupportedContentType(content_type.to_string()))
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EnvelopeFormat::Multipart { .. } => "multipart",
            EnvelopeFormat::Json => "json",
        }
    }
}

/// Take the first `boundary=` parameter of a content type.
///
/// Parameters are split on `;` and trimmed. A quoted value has its surrounding
/// double quotes removed. An empty value counts as absent.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let value = content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))?;

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
