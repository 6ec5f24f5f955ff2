//! Envelope readers.
//!
//! A reader yields sub-requests one at a time into a caller-supplied buffer.
//! It is built per inbound request, consumed once, and dropped.

pub mod json;
pub mod multipart;

pub use json::JsonReader;
pub use multipart::MultipartReader;

use crate::batch::model::SubRequest;

/// Outcome of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer holds the next sub-request.
    Ready,
    /// No more sub-requests.
    Exhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("part missing url header")]
    MissingUrl,
    #[error("part missing method header")]
    MissingMethod,
    #[error("failed to read multipart message: {0}")]
    Multipart(#[from] multer::Error),
}

impl ReadError {
    /// Whether the envelope can no longer be read past this error.
    ///
    /// Missing routing headers reject one part; the stream stays aligned on
    /// the next boundary. Framing and IO errors end the envelope.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReadError::Multipart(_))
    }
}

pub enum RequestReader {
    Multipart(MultipartReader),
    Json(JsonReader),
}

impl RequestReader {
    /// Read the next sub-request into `req`, which must be reset.
    pub async fn read_next(&mut self, req: &mut SubRequest) -> Result<ReadStatus, ReadError> {
        match self {
            RequestReader::Multipart(reader) => reader.read_next(req).await,
            RequestReader::Json(reader) => Ok(reader.read_next(req)),
        }
    }
}
