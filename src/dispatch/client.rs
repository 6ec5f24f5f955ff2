//! Hyper-based outbound client.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::{Method, Request, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::batch::model::{SubRequest, SubResponse};
use crate::config::UpstreamConfig;
use crate::dispatch::{DispatchError, Dispatcher};

/// Dispatcher backed by a pooled hyper client. Cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct HyperDispatcher {
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Option<Duration>,
    max_response_body: usize,
}

impl HyperDispatcher {
    pub fn new(config: &UpstreamConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build(connector);

        Self {
            client,
            request_timeout: (config.request_timeout_ms > 0)
                .then(|| Duration::from_millis(config.request_timeout_ms)),
            max_response_body: config.max_response_body_bytes,
        }
    }

    async fn send(
        &self,
        request: Request<Full<Bytes>>,
        res: &mut SubResponse,
    ) -> Result<(), DispatchError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| DispatchError::Transport(error_chain(&e)))?;

        let (parts, body) = response.into_parts();
        let body = Limited::new(body, self.max_response_body)
            .collect()
            .await
            .map_err(|e| DispatchError::Body(e.to_string()))?
            .to_bytes();

        res.status = parts.status.as_u16();
        for (name, value) in parts.headers.iter() {
            res.headers
                .push(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        res.body = body;
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for HyperDispatcher {
    async fn dispatch(
        &self,
        req: &SubRequest,
        res: &mut SubResponse,
    ) -> Result<(), DispatchError> {
        let request = build_request(req)?;
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.send(request, res))
                .await
                .map_err(|_| DispatchError::Timeout(limit.as_millis() as u64))?,
            None => self.send(request, res).await,
        }
    }
}

/// Turn a sub-request into a hyper request.
///
/// Framing headers are dropped: the body is fully materialized and hyper
/// sets its own `Content-Length`.
pub fn build_request(req: &SubRequest) -> Result<Request<Full<Bytes>>, DispatchError> {
    let method = Method::from_bytes(req.method.as_bytes())
        .map_err(|_| DispatchError::InvalidMethod(req.method.clone()))?;

    let uri: Uri = req.url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        DispatchError::InvalidUrl {
            url: req.url.clone(),
            reason: e.to_string(),
        }
    })?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(DispatchError::InvalidUrl {
            url: req.url.clone(),
            reason: "url must be absolute".to_string(),
        });
    }

    let mut request = Request::new(Full::new(req.body.clone()));
    *request.method_mut() = method;
    *request.uri_mut() = uri;

    let headers = request.headers_mut();
    for (name, value) in req.headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| DispatchError::InvalidHeader(format!("name {name:?}")))?;
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| DispatchError::InvalidHeader(format!("value for {name}")))?;
        headers.append(name, value);
    }

    Ok(request)
}

/// Render an error with its sources, e.g. `client error (Connect): tcp connect
/// error: Connection refused (os error 111)`.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
