//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// Rendered as `{"error": <kind>, "message": <text>}` so clients can branch
/// on the kind.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Social(#[from] helpnet_social::Error),

  #[error(transparent)]
  Match(#[from] helpnet_match::Error),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Social(e) => e.kind(),
      Self::Match(e) => e.kind(),
      Self::NotFound(_) => "not_found",
      Self::BadRequest(_) => "bad_request",
      Self::Store(_) => "store",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self.kind() {
      "consent_required" | "invite_blocked" => StatusCode::FORBIDDEN,
      "unknown_provider" | "not_found" => StatusCode::NOT_FOUND,
      "token_expired" | "token_not_found" => StatusCode::UNAUTHORIZED,
      "rate_limit_timeout" => StatusCode::TOO_MANY_REQUESTS,
      "auth_flow_failed" | "import_failed" | "invite_delivery_failed" | "classifier" => {
        StatusCode::BAD_GATEWAY
      }
      "invalid_transition" | "conflict" => StatusCode::CONFLICT,
      "invalid_input" | "bad_request" => StatusCode::BAD_REQUEST,
      "cancelled" => StatusCode::SERVICE_UNAVAILABLE,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(kind = self.kind(), error = %self, "request failed");
    }
    let body = json!({ "error": self.kind(), "message": self.to_string() });
    (status, Json(body)).into_response()
  }
}
