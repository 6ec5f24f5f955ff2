//! `application/json` response writer.
//!
//! Emits `{"responses":[E0,E1,...]}` incrementally. A separator is written
//! before every element except the first, so the element count never has to
//! be known up front.

use bytes::{BufMut, BytesMut};
use serde_json::value::RawValue;

use crate::batch::model::{JsonBody, JsonElement, JsonSubResponse, SubResponse};
use crate::batch::writer::WriteError;

const HEAD: &[u8] = br#"{"responses":["#;
const TAIL: &[u8] = b"]}";

#[derive(Debug, Default)]
pub struct JsonWriter {
    buf: BytesMut,
    scratch: Vec<u8>,
    elements: usize,
    opened: bool,
    closed: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) -> Result<(), WriteError> {
        if self.opened {
            return Err(WriteError::AlreadyOpen);
        }
        self.buf.put_slice(HEAD);
        self.opened = true;
        Ok(())
    }

    /// Append a response element.
    ///
    /// A body labelled `application/json` is embedded raw under `json`, minus
    /// any whitespace around the value. When it is empty or not valid JSON it
    /// is sent under `bytes` instead.
    pub fn write_response(&mut self, res: &SubResponse) -> Result<(), WriteError> {
        let raw = if res.has_json_body() {
            serde_json::from_slice::<&RawValue>(&res.body).ok()
        } else {
            None
        };
        let body = match raw {
            Some(raw) => JsonBody::Json(raw),
            None => JsonBody::Bytes(&res.body),
        };
        let element = JsonElement::Response(JsonSubResponse {
            status_code: res.status,
            headers: res.headers.iter().collect(),
            body,
        });
        self.write_element(&element)
    }

    pub fn write_error(&mut self, detail: &str) -> Result<(), WriteError> {
        self.write_element(&JsonElement::Error { detail })
    }

    pub fn close(&mut self) -> Result<(), WriteError> {
        self.ensure_writable()?;
        self.buf.put_slice(TAIL);
        self.closed = true;
        Ok(())
    }

    pub(crate) fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    fn write_element(&mut self, element: &JsonElement<'_>) -> Result<(), WriteError> {
        self.ensure_writable()?;

        // Encode aside first so a failure leaves the envelope untouched.
        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, element)?;

        if self.elements > 0 {
            self.buf.put_u8(b',');
        }
        self.buf.put_slice(&self.scratch);
        self.elements += 1;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), WriteError> {
        if !self.opened {
            Err(WriteError::NotOpen)
        } else if self.closed {
            Err(WriteError::Closed)
        } else {
            Ok(())
        }
    }
}
