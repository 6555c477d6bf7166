//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use ident_core::ResolveError;
use thiserror::Error;
use tracing::error;

use crate::wire::IdentifyResponse;

/// Body text for every server fault. Details go to the log only.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("no contact matches the given email or phoneNumber")]
  NotFound,

  #[error(transparent)]
  Resolve(#[from] ResolveError),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
      ApiError::Resolve(e) if e.is_client_error() => {
        (StatusCode::BAD_REQUEST, e.to_string())
      }
      ApiError::Resolve(e) => {
        error!(error = %e, source = ?std::error::Error::source(e), "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_owned())
      }
    };

    let body = Json(IdentifyResponse::failed(message));
    match &self {
      ApiError::Resolve(e) if e.is_retryable() => {
        (status, [(header::RETRY_AFTER, "1")], body).into_response()
      }
      _ => (status, body).into_response(),
    }
  }
}
