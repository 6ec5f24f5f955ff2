//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router; every path and method goes to the batch handler
//! - Wire up middleware (request ID, tracing, body limit, panic guard)
//! - Enforce the concurrent batch limit
//! - Serve until the shutdown signal fires

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::batch::{BatchError, BatchHandler};
use crate::config::ProxyConfig;
use crate::dispatch::{Dispatcher, HyperDispatcher};
use crate::http::request::MakeBatchId;
use crate::http::response::panic_response;
use crate::security::limits::{body_limit_layer, BatchLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<BatchHandler>,
    pub limiter: BatchLimiter,
}

/// HTTP server for the batch proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server that dispatches through a pooled hyper client.
    pub fn new(config: ProxyConfig) -> Self {
        let dispatcher = Arc::new(HyperDispatcher::new(&config.upstream));
        Self::with_dispatcher(config, dispatcher)
    }

    /// Create a server with a custom outbound dispatcher.
    pub fn with_dispatcher(config: ProxyConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let handler = Arc::new(BatchHandler::new(
            dispatcher,
            config.limits.buffer_pool_size,
            config.limits.max_body_bytes,
        ));
        let state = AppState {
            handler,
            limiter: BatchLimiter::new(config.listener.max_concurrent_batches),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .fallback(batch_handler)
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(body_limit_layer(config.limits.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeBatchId))
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_concurrent_batches = self.config.listener.max_concurrent_batches,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Routes every inbound request into the batch pipeline.
async fn batch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(permit) = state.limiter.try_acquire() else {
        tracing::warn!(
            max_concurrent_batches = state.limiter.max_batches(),
            "Batch rejected, no free slot"
        );
        return BatchError::Overloaded.into_response();
    };

    match state.handler.handle(request, permit).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
