//! `application/json` request reader.
//!
//! The whole envelope is decoded up front; sub-requests are then handed out
//! one at a time in document order.

use axum::body::Body;
use bytes::Bytes;

use crate::batch::model::{JsonBatchRequest, JsonSubRequest, SubRequest};
use crate::batch::reader::ReadStatus;
use crate::batch::BatchError;

#[derive(Debug)]
pub struct JsonReader {
    requests: std::vec::IntoIter<JsonSubRequest>,
}

impl JsonReader {
    /// Read the inbound body (at most `limit` bytes) and decode the envelope.
    pub async fn init(body: Body, limit: usize) -> Result<Self, BatchError> {
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| BatchError::Body(e.to_string()))?;
        Self::from_slice(&bytes).map_err(|e| BatchError::InvalidJson(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: JsonBatchRequest = serde_json::from_slice(bytes)?;
        Ok(Self {
            requests: envelope.requests.into_iter(),
        })
    }

    /// Sub-requests not yet handed out.
    pub fn remaining(&self) -> usize {
        self.requests.len()
    }

    pub fn read_next(&mut self, req: &mut SubRequest) -> ReadStatus {
        let Some(next) = self.requests.next() else {
            return ReadStatus::Exhausted;
        };

        req.method = next.method;
        req.url = next.url;
        for (name, value) in next.headers {
            req.headers.push(name, value);
        }

        // `bytes` wins when both representations are present.
        req.body = match (next.body.bytes, next.body.json) {
            (Some(bytes), _) => Bytes::from(bytes),
            (None, Some(json)) => Bytes::copy_from_slice(json.get().as_bytes()),
            (None, None) => Bytes::new(),
        };

        ReadStatus::Ready
    }
}
