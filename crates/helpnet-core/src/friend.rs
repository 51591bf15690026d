//! Anonymised external contacts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The one channel kept for reaching a contact outside the provider's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ContactChannel {
  Phone(String),
  Email(String),
}

/// A contact imported from a provider, stripped down to what an invitation
/// needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
  /// Provider-side identifier; opaque to the platform.
  pub external_id:  String,
  pub display_name: String,
  pub provider:     String,
  /// The platform user whose network this contact was imported from.
  pub owner_id:     Uuid,
  #[serde(default)]
  pub contact:      Option<ContactChannel>,
}

impl Friend {
  pub fn phone(&self) -> Option<&str> {
    match &self.contact {
      Some(ContactChannel::Phone(p)) => Some(p),
      _ => None,
    }
  }

  pub fn email(&self) -> Option<&str> {
    match &self.contact {
      Some(ContactChannel::Email(e)) => Some(e),
      _ => None,
    }
  }
}

/// An invitation that left the platform; the basis of daily quotas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
  pub invite_id:   Uuid,
  pub user_id:     Uuid,
  pub provider_id: String,
  pub external_id: String,
  pub sent_at:     chrono::DateTime<chrono::Utc>,
}
