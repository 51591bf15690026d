//! Per-user, per-provider consent records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's explicit decision about one provider.
///
/// A record only ever comes into existence through an explicit grant; a
/// revoked record stays around with `granted = false` so the history of the
/// decision is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
  pub user_id:     Uuid,
  pub provider_id: String,
  pub granted:     bool,
  pub granted_at:  DateTime<Utc>,
  pub revoked_at:  Option<DateTime<Utc>>,
}

impl ConsentRecord {
  pub fn granted(user_id: Uuid, provider_id: impl Into<String>, at: DateTime<Utc>) -> Self {
    Self {
      user_id,
      provider_id: provider_id.into(),
      granted: true,
      granted_at: at,
      revoked_at: None,
    }
  }

  /// Mark this record revoked as of `at`.
  pub fn revoke(&mut self, at: DateTime<Utc>) {
    self.granted = false;
    self.revoked_at = Some(at);
  }
}
