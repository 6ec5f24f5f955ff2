//! Batch handler: envelope in, envelope out.
//!
//! The handler validates the envelope head and reads the first sub-request
//! before committing to a `200`. From then on the outbound envelope is
//! streamed by a task that owns the reader, the writer and the buffers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, StatusCode},
};
use bytes::Bytes;
use futures_util::{stream, FutureExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::batch::content_type::EnvelopeFormat;
use crate::batch::pool::{Exchange, ExchangePool, PooledExchange};
use crate::batch::reader::{JsonReader, MultipartReader, ReadStatus, RequestReader};
use crate::batch::writer::{JsonWriter, MultipartWriter, ResponseWriter, WriteError};
use crate::batch::BatchError;
use crate::dispatch::Dispatcher;
use crate::http::request::X_REQUEST_ID;
use crate::observability::metrics;
use crate::security::limits::BatchPermit;

/// Chunks buffered between the batch task and the connection.
const CHUNK_BACKLOG: usize = 8;

type Chunk = Result<Bytes, std::io::Error>;

/// Entry point of the batch pipeline, shared by all connections.
pub struct BatchHandler {
    dispatcher: Arc<dyn Dispatcher>,
    pool: Arc<ExchangePool>,
    max_body_bytes: usize,
}

impl BatchHandler {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, pool_size: usize, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            pool: Arc::new(ExchangePool::new(pool_size)),
            max_body_bytes,
        }
    }

    /// Handle one inbound envelope.
    ///
    /// Returns `Err` only before the envelope is opened; the caller turns it
    /// into a plain-text response. `permit` is held until the batch finishes.
    pub async fn handle(
        &self,
        request: Request<Body>,
        permit: BatchPermit,
    ) -> Result<Response<Body>, BatchError> {
        let started = Instant::now();
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();

        let format = EnvelopeFormat::from_content_type(&content_type).map_err(|e| {
            tracing::warn!(request_id = %request_id, content_type = %content_type, error = %e, "Rejected envelope");
            metrics::record_batch("unknown", "rejected", started);
            e
        })?;
        let label = format.label();

        let body = request.into_body();
        let (mut reader, mut writer) = match format {
            EnvelopeFormat::Multipart { boundary } => (
                RequestReader::Multipart(MultipartReader::new(
                    body.into_data_stream(),
                    &boundary,
                    self.max_body_bytes as u64,
                )),
                ResponseWriter::Multipart(MultipartWriter::new()),
            ),
            EnvelopeFormat::Json => {
                let reader = JsonReader::init(body, self.max_body_bytes)
                    .await
                    .map_err(|e| {
                        tracing::warn!(request_id = %request_id, error = %e, "Failed to parse json envelope");
                        metrics::record_batch(label, "rejected", started);
                        e
                    })?;
                tracing::debug!(request_id = %request_id, requests = reader.remaining(), "Decoded json envelope");
                (
                    RequestReader::Json(reader),
                    ResponseWriter::Json(JsonWriter::new()),
                )
            }
        };

        let mut exchange = self.pool.acquire();

        // Nothing has been sent yet, so a bad first element rejects the batch.
        let first = reader
            .read_next(&mut exchange.request)
            .await
            .map_err(|e| {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to read first sub-request");
                metrics::record_batch(label, "rejected", started);
                BatchError::Read(e)
            })?;

        writer.open().map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Failed to open response envelope");
            metrics::record_batch(label, "failed", started);
            BatchError::Open(e)
        })?;

        let content_type = HeaderValue::try_from(writer.content_type())
            .map_err(|e| BatchError::Open(WriteError::ContentType(e)))?;

        let (tx, rx) = mpsc::channel::<Chunk>(CHUNK_BACKLOG);
        let run = BatchRun {
            reader,
            writer,
            exchange,
            dispatcher: Arc::clone(&self.dispatcher),
            tx,
            summary: BatchSummary::default(),
        };

        let span = tracing::info_span!("batch", request_id = %request_id, format = label);
        tokio::spawn(
            async move {
                let _permit = permit;
                let abort_tx = run.tx.clone();
                match AssertUnwindSafe(run.drive(first)).catch_unwind().await {
                    Ok(Ok(summary)) => {
                        tracing::debug!(
                            responses = summary.responses,
                            errors = summary.errors,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Batch complete"
                        );
                        metrics::record_batch(label, "completed", started);
                    }
                    Ok(Err(BatchAbort::ClientGone)) => {
                        tracing::warn!("Client went away, batch abandoned");
                        metrics::record_batch(label, "abandoned", started);
                    }
                    Ok(Err(BatchAbort::Writer(e))) => {
                        tracing::error!(error = %e, "Failed to write response envelope");
                        metrics::record_batch(label, "failed", started);
                        let _ = abort_tx.send(Err(std::io::Error::other(e))).await;
                    }
                    Err(_) => {
                        tracing::error!("Recovered from panic in batch");
                        metrics::record_batch(label, "panicked", started);
                        let _ = abort_tx
                            .send(Err(std::io::Error::other("batch aborted")))
                            .await;
                    }
                }
            }
            .instrument(span),
        );

        let chunks = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });

        let mut response = Response::new(Body::from_stream(chunks));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        Ok(response)
    }
}

/// Why a streaming batch stopped before closing its envelope.
#[derive(Debug)]
enum BatchAbort {
    /// The inbound connection is gone; nobody reads the envelope anymore.
    ClientGone,
    Writer(WriteError),
}

impl From<WriteError> for BatchAbort {
    fn from(e: WriteError) -> Self {
        BatchAbort::Writer(e)
    }
}

#[derive(Debug, Default)]
struct BatchSummary {
    responses: usize,
    errors: usize,
}

/// State of a batch once its envelope is open.
struct BatchRun {
    reader: RequestReader,
    writer: ResponseWriter,
    exchange: PooledExchange,
    dispatcher: Arc<dyn Dispatcher>,
    tx: mpsc::Sender<Chunk>,
    summary: BatchSummary,
}

impl BatchRun {
    /// Dispatch every sub-request and close the envelope. `status` is the
    /// outcome of the read already performed into the exchange buffer.
    async fn drive(mut self, mut status: ReadStatus) -> Result<BatchSummary, BatchAbort> {
        self.flush().await?;

        while status == ReadStatus::Ready {
            self.dispatch_current().await?;
            status = self.advance().await?;
        }

        self.writer.close()?;
        self.flush().await?;
        Ok(self.summary)
    }

    /// Send the buffered request and write its element.
    async fn dispatch_current(&mut self) -> Result<(), BatchAbort> {
        let started = Instant::now();
        let Exchange { request, response } = &mut *self.exchange;

        let outcome = tokio::select! {
            outcome = self.dispatcher.dispatch(request, response) => outcome,
            _ = self.tx.closed() => return Err(BatchAbort::ClientGone),
        };

        match outcome {
            Ok(()) => {
                metrics::record_subrequest("ok", started);
                match self.writer.write_response(response) {
                    Ok(()) => self.summary.responses += 1,
                    Err(WriteError::Encode(e)) => {
                        tracing::warn!(url = %request.url, error = %e, "Failed to encode sub-response");
                        self.writer.write_error(&format!("failed to encode response: {e}"))?;
                        self.summary.errors += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => {
                tracing::warn!(method = %request.method, url = %request.url, error = %e, "Sub-request failed");
                metrics::record_subrequest("dispatch_error", started);
                self.writer.write_error(&e.to_string())?;
                self.summary.errors += 1;
            }
        }

        self.flush().await
    }

    /// Reset the buffers and read the next sub-request.
    ///
    /// Unreadable elements are written as error elements. After a fatal read
    /// error the envelope is treated as exhausted.
    async fn advance(&mut self) -> Result<ReadStatus, BatchAbort> {
        loop {
            self.exchange.reset();
            match self.reader.read_next(&mut self.exchange.request).await {
                Ok(status) => return Ok(status),
                Err(e) => {
                    tracing::warn!(error = %e, fatal = e.is_fatal(), "Failed to read sub-request");
                    metrics::record_read_error();
                    self.writer.write_error(&e.to_string())?;
                    self.summary.errors += 1;
                    self.flush().await?;
                    if e.is_fatal() {
                        return Ok(ReadStatus::Exhausted);
                    }
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<(), BatchAbort> {
        if let Some(chunk) = self.writer.take_chunk() {
            self.tx
                .send(Ok(chunk))
                .await
                .map_err(|_| BatchAbort::ClientGone)?;
        }
        Ok(())
    }
}
