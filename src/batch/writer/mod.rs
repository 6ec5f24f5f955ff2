//! Envelope writers.
//!
//! Lifecycle: `open` → (`write_response` | `write_error`)* → `close`.
//! Writers encode into an internal buffer; the handler drains it with
//! `take_chunk` after every call and streams the chunk to the client.

pub mod json;
pub mod multipart;

pub use json::JsonWriter;
pub use multipart::MultipartWriter;

use bytes::Bytes;

use crate::batch::model::SubResponse;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to encode element: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("response envelope already opened")]
    AlreadyOpen,
    #[error("response envelope not opened")]
    NotOpen,
    #[error("response envelope already closed")]
    Closed,
    #[error("invalid envelope content type: {0}")]
    ContentType(#[from] axum::http::header::InvalidHeaderValue),
}

#[derive(Debug)]
pub enum ResponseWriter {
    Multipart(MultipartWriter),
    Json(JsonWriter),
}

impl ResponseWriter {
    /// `Content-Type` of the outbound envelope.
    pub fn content_type(&self) -> String {
        match self {
            ResponseWriter::Multipart(w) => w.content_type(),
            ResponseWriter::Json(_) => "application/json".to_string(),
        }
    }

    pub fn open(&mut self) -> Result<(), WriteError> {
        match self {
            // The boundary already travels in the Content-Type.
            ResponseWriter::Multipart(_) => Ok(()),
            ResponseWriter::Json(w) => w.open(),
        }
    }

    pub fn write_response(&mut self, res: &SubResponse) -> Result<(), WriteError> {
        match self {
            ResponseWriter::Multipart(w) => w.write_response(res),
            ResponseWriter::Json(w) => w.write_response(res),
        }
    }

    pub fn write_error(&mut self, detail: &str) -> Result<(), WriteError> {
        match self {
            ResponseWriter::Multipart(w) => w.write_error(detail),
            ResponseWriter::Json(w) => w.write_error(detail),
        }
    }

    pub fn close(&mut self) -> Result<(), WriteError> {
        match self {
            ResponseWriter::Multipart(w) => w.close(),
            ResponseWriter::Json(w) => w.close(),
        }
    }

    /// Bytes encoded since the last call, if any.
    pub fn take_chunk(&mut self) -> Option<Bytes> {
        let buf = match self {
            ResponseWriter::Multipart(w) => w.buffer(),
            ResponseWriter::Json(w) => w.buffer(),
        };
        if buf.is_empty() {
            None
        } else {
            Some(buf.split().freeze())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_drained_once() {
        let mut w = ResponseWriter::Json(JsonWriter::new());
        w.open().unwrap();
        assert_eq!(w.take_chunk().as_deref(), Some(&br#"{"responses":["#[..]));
        assert_eq!(w.take_chunk(), None);
        w.close().unwrap();
        assert_eq!(w.take_chunk().as_deref(), Some(&b"]}"[..]));
    }

    #[test]
    fn multipart_open_writes_nothing() {
        let mut w = ResponseWriter::Multipart(MultipartWriter::with_boundary("B".into()));
        w.open().unwrap();
        assert_eq!(w.take_chunk(), None);
        assert_eq!(w.content_type(), "multipart/mixed; boundary=B");
    }
}
