//! Persisted provider credentials.
//!
//! Only ciphertext crosses this boundary: the storage layer never sees a
//! plaintext access or refresh token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An access/refresh token pair as stored at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
  pub user_id:           Uuid,
  pub provider_id:       String,
  /// Nonce-prefixed AES-GCM ciphertext, base64 encoded.
  pub access_token_enc:  String,
  pub refresh_token_enc: Option<String>,
  /// `None` for sessions that never expire (bot and deep-link handshakes).
  pub expires_at:        Option<DateTime<Utc>>,
  pub stored_at:         DateTime<Utc>,
}

impl TokenRecord {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|exp| exp <= now)
  }
}
