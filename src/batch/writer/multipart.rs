//! `multipart/mixed` response writer.
//!
//! One part per element. Response parts carry the upstream headers verbatim
//! plus `x-mani-status`; error parts carry `x-mani-error` and repeat the
//! detail as body. Framing follows RFC 2046: the first delimiter has no
//! leading CRLF, every later one does.

use bytes::{BufMut, BytesMut};
use rand::Rng;

use crate::batch::model::SubResponse;
use crate::batch::writer::WriteError;

pub const ERROR_HEADER: &str = "x-mani-error";
pub const STATUS_HEADER: &str = "x-mani-status";

#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    buf: BytesMut,
    parts: usize,
    closed: bool,
}

impl MultipartWriter {
    /// Create a writer with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(random_boundary())
    }

    pub fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            buf: BytesMut::new(),
            parts: 0,
            closed: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    pub fn write_response(&mut self, res: &SubResponse) -> Result<(), WriteError> {
        let status = res.status.to_string();
        let headers = res
            .headers
            .iter()
            .chain(std::iter::once((STATUS_HEADER, status.as_str())));
        self.begin_part(headers)?;
        self.buf.put_slice(&res.body);
        Ok(())
    }

    pub fn write_error(&mut self, detail: &str) -> Result<(), WriteError> {
        self.begin_part(std::iter::once((ERROR_HEADER, detail)))?;
        self.buf.put_slice(detail.as_bytes());
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), WriteError> {
        self.ensure_open()?;
        if self.parts > 0 {
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"--\r\n");
        self.closed = true;
        Ok(())
    }

    pub(crate) fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    fn begin_part<'a>(
        &mut self,
        headers: impl Iterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), WriteError> {
        self.ensure_open()?;
        if self.parts > 0 {
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"\r\n");
        for (name, value) in headers {
            self.buf.put_slice(name.as_bytes());
            self.buf.put_slice(b": ");
            put_header_value(&mut self.buf, value);
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"\r\n");
        self.parts += 1;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), WriteError> {
        if self.closed {
            Err(WriteError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Line breaks would end the header block early.
fn put_header_value(buf: &mut BytesMut, value: &str) {
    for b in value.bytes() {
        buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
    }
}

fn random_boundary() -> String {
    let bytes: [u8; 30] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
