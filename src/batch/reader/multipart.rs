//! `multipart/mixed` request reader.
//!
//! Each part is one sub-request. The target is carried in the `x-mani-url`
//! and `x-mani-method` part headers, which are consumed; every other part
//! header is forwarded. The part body is read fully before dispatch.

use bytes::Bytes;
use futures_util::Stream;
use multer::{Constraints, Multipart, SizeLimit};

use crate::batch::model::SubRequest;
use crate::batch::reader::{ReadError, ReadStatus};

pub const URL_HEADER: &str = "x-mani-url";
pub const METHOD_HEADER: &str = "x-mani-method";

pub struct MultipartReader {
    inner: Multipart<'static>,
    exhausted: bool,
}

impl MultipartReader {
    /// Wrap a body stream split by `boundary`. The whole stream is capped at
    /// `max_bytes`.
    pub fn new<S, O, E>(stream: S, boundary: &str, max_bytes: u64) -> Self
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(max_bytes));
        Self {
            inner: Multipart::with_constraints(stream, boundary.to_string(), constraints),
            exhausted: false,
        }
    }

    pub async fn read_next(&mut self, req: &mut SubRequest) -> Result<ReadStatus, ReadError> {
        if self.exhausted {
            return Ok(ReadStatus::Exhausted);
        }

        let field = match self.inner.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                self.exhausted = true;
                return Ok(ReadStatus::Exhausted);
            }
            Err(e) => {
                self.exhausted = true;
                return Err(ReadError::Multipart(e));
            }
        };

        let mut url = None;
        let mut method = None;
        for (name, value) in field.headers() {
            let value = String::from_utf8_lossy(value.as_bytes());
            match name.as_str() {
                URL_HEADER => {
                    url.get_or_insert_with(|| value.into_owned());
                }
                METHOD_HEADER => {
                    method.get_or_insert_with(|| value.into_owned());
                }
                other => req.headers.push(other, value),
            }
        }

        // The body is drained even for a rejected part so the next part
        // starts on a boundary.
        let body = field.bytes().await.map_err(|e| {
            self.exhausted = true;
            ReadError::Multipart(e)
        })?;

        req.url = url.filter(|u| !u.is_empty()).ok_or(ReadError::MissingUrl)?;
        req.method = method
            .filter(|m| !m.is_empty())
            .ok_or(ReadError::MissingMethod)?;
        req.body = body;

        Ok(ReadStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn reader(body: &'static str) -> MultipartReader {
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            body.as_bytes(),
        ))]);
        MultipartReader::new(chunks, "XX", 1024 * 1024)
    }

    #[tokio::test]
    async fn reads_parts_in_order_and_strips_routing_headers() {
        let mut r = reader(
            "--XX\r\n\
             x-mani-url: http://upstream/a\r\n\
             x-mani-method: POST\r\n\
             content-type: text/plain\r\n\
             x-trace: 1\r\n\
             \r\n\
             first\r\n\
             --XX\r\n\
             x-mani-method: GET\r\n\
             x-mani-url: http://upstream/b\r\n\
             \r\n\
             \r\n\
             --XX--\r\n",
        );

        let mut req = SubRequest::default();
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Ready);
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "http://upstream/a");
        assert_eq!(&req.body[..], b"first");
        assert_eq!(req.headers.get(URL_HEADER), None);
        assert_eq!(req.headers.get(METHOD_HEADER), None);
        assert_eq!(req.headers.get("content-type"), Some("text/plain"));
        assert_eq!(req.headers.get("x-trace"), Some("1"));

        req.reset();
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Ready);
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "http://upstream/b");
        assert!(req.body.is_empty());
        assert!(req.headers.is_empty());

        req.reset();
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Exhausted);
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Exhausted);
    }

    #[tokio::test]
    async fn missing_headers_are_element_errors() {
        let mut r = reader(
            "--XX\r\n\
             x-mani-method: GET\r\n\
             \r\n\
             no url\r\n\
             --XX\r\n\
             x-mani-url: http://upstream/\r\n\
             \r\n\
             no method\r\n\
             --XX\r\n\
             x-mani-url: http://upstream/ok\r\n\
             x-mani-method: PUT\r\n\
             \r\n\
             fine\r\n\
             --XX--\r\n",
        );

        let mut req = SubRequest::default();
        let err = r.read_next(&mut req).await.unwrap_err();
        assert_eq!(err.to_string(), "part missing url header");
        assert!(!err.is_fatal());

        req.reset();
        let err = r.read_next(&mut req).await.unwrap_err();
        assert_eq!(err.to_string(), "part missing method header");

        req.reset();
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Ready);
        assert_eq!(req.url, "http://upstream/ok");
        assert_eq!(&req.body[..], b"fine");
    }

    #[tokio::test]
    async fn broken_framing_is_fatal() {
        let mut r = reader("--XX\r\nx-mani-url: http://u/\r\nx-mani-method: GET\r\n\r\ntruncated");

        let mut req = SubRequest::default();
        let err = r.read_next(&mut req).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(r.read_next(&mut req).await.unwrap(), ReadStatus::Exhausted);
    }
}
