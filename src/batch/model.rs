//! Shared data shapes of the batch pipeline.
//!
//! `SubRequest` and `SubResponse` are the buffers handed between reader,
//! dispatcher and writer. They are reset and reused for every element of a
//! batch, so `reset` keeps allocations around.
//!
//! The JSON envelope types mirror the wire documents:
//!
//! ```text
//! {"requests":[{"url","method","headers":[[k,v]],"body":{"bytes"|"json"}}]}
//! {"responses":[{"response":{"statusCode","headers","body"}} | {"error":{"detail"}}]}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Ordered header list. Duplicates are kept, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing ones with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One outbound HTTP exchange to perform.
#[derive(Debug, Clone, Default)]
pub struct SubRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderList,
    pub body: Bytes,
}

impl SubRequest {
    pub fn reset(&mut self) {
        self.method.clear();
        self.url.clear();
        self.headers.clear();
        self.body = Bytes::new();
    }
}

/// Result of one outbound HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct SubResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Bytes,
}

impl SubResponse {
    pub fn reset(&mut self) {
        self.status = 0;
        self.headers.clear();
        self.body = Bytes::new();
    }

    /// Whether the body should be embedded as raw JSON in a JSON envelope.
    pub fn has_json_body(&self) -> bool {
        self.headers
            .get("content-type")
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

/// Inline body of a JSON envelope element: opaque bytes or embedded JSON.
///
/// Bytes travel base64-encoded (standard alphabet, padded). Absent fields are
/// omitted on output and read as `None` on input.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BodyEnum {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Box<RawValue>>,
}

/// Inbound JSON envelope.
#[derive(Debug, Deserialize)]
pub struct JsonBatchRequest {
    #[serde(default)]
    pub requests: Vec<JsonSubRequest>,
}

#[derive(Debug, Deserialize)]
pub struct JsonSubRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: BodyEnum,
}

/// Outbound JSON envelope element. Exactly one field is set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JsonElement<'a> {
    Response(JsonSubResponse<'a>),
    Error { detail: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSubResponse<'a> {
    pub status_code: u16,
    pub headers: Vec<(&'a str, &'a str)>,
    pub body: JsonBody<'a>,
}

/// Borrowed form of `BodyEnum` used when serializing responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JsonBody<'a> {
    #[serde(serialize_with = "base64_bytes::serialize_slice")]
    Bytes(&'a [u8]),
    Json(&'a RawValue),
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn serialize_slice<S: Serializer>(value: &&[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
