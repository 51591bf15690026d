//! Error type for the social-import pipeline.
//!
//! Every failure is a structured kind plus context; transport errors from
//! provider connectors never escape unwrapped.

use std::time::Duration;

use helpnet_core::metrics::BlockReason;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("consent required: user {user_id} has not approved {provider_id}")]
  ConsentRequired { user_id: Uuid, provider_id: String },

  #[error("unknown provider: {0}")]
  UnknownProvider(String),

  #[error("authentication with {provider_id} failed: {reason}")]
  AuthFlowFailed { provider_id: String, reason: String },

  #[error("token for {provider_id} has expired; reconnect required")]
  TokenExpired { user_id: Uuid, provider_id: String },

  #[error("not connected to {provider_id}")]
  TokenNotFound { user_id: Uuid, provider_id: String },

  #[error("import from {provider_id} failed after {attempts} attempt(s): {reason}")]
  ImportFailed {
    provider_id: String,
    attempts:    u32,
    reason:      String,
  },

  #[error("invite blocked: {0}")]
  InviteBlocked(BlockReason),

  #[error("invite delivery through {provider_id} failed: {reason}")]
  InviteDeliveryFailed { provider_id: String, reason: String },

  #[error("rate limit for {provider_id} not available within {waited:?}")]
  RateLimitTimeout { provider_id: String, waited: Duration },

  #[error("operation cancelled")]
  Cancelled,

  #[error("crypto error: {0}")]
  Crypto(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// Stable, machine-readable name of the error kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::ConsentRequired { .. } => "consent_required",
      Self::UnknownProvider(_) => "unknown_provider",
      Self::AuthFlowFailed { .. } => "auth_flow_failed",
      Self::TokenExpired { .. } => "token_expired",
      Self::TokenNotFound { .. } => "token_not_found",
      Self::ImportFailed { .. } => "import_failed",
      Self::InviteBlocked(_) => "invite_blocked",
      Self::InviteDeliveryFailed { .. } => "invite_delivery_failed",
      Self::RateLimitTimeout { .. } => "rate_limit_timeout",
      Self::Cancelled => "cancelled",
      Self::Crypto(_) => "crypto",
      Self::Store(_) => "store",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blocked_invites_carry_an_actionable_reason() {
    let e = Error::InviteBlocked(BlockReason::DailyLimitReached);
    assert_eq!(e.to_string(), "invite blocked: daily invite limit reached");
    assert_eq!(e.kind(), "invite_blocked");
  }

  #[test]
  fn consent_message_names_the_provider() {
    let e = Error::ConsentRequired { user_id: Uuid::nil(), provider_id: "facebook".into() };
    assert!(e.to_string().contains("facebook"));
    assert_eq!(e.kind(), "consent_required");
  }
}
