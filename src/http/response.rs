//! Plain-text responses for batches that never opened an envelope.
//!
//! - Envelope head problems → 400
//! - Envelope could not be opened → 500
//! - No free batch slot → 503
//! - Panic in the handler → 500 with an empty body

use std::any::Any;

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::batch::BatchError;

impl BatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BatchError::UnsupportedContentType(_)
            | BatchError::MissingBoundary
            | BatchError::InvalidJson(_)
            | BatchError::Body(_)
            | BatchError::Read(_) => StatusCode::BAD_REQUEST,
            BatchError::Open(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BatchError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Response for a panic caught by the catch-panic layer.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Recovered from panic");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::reader::ReadError;

    #[test]
    fn head_errors_are_bad_requests() {
        assert_eq!(
            BatchError::UnsupportedContentType("text/plain".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BatchError::Read(ReadError::MissingMethod).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BatchError::Overloaded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn panic_response_is_empty_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
