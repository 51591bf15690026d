//! Reduction of raw provider contacts to [`Friend`]s.
//!
//! Everything a provider sends is dropped except the opaque id, a display
//! name and at most one contact channel, and that channel only when
//! delivering an invitation through the provider needs it: a phone number
//! for deep-link providers, an e-mail address when the provider's scope
//! explicitly asks for e-mail.

use helpnet_core::{
  friend::{ContactChannel, Friend},
  provider::{IntegrationMethod, Provider},
};
use uuid::Uuid;

use crate::connector::RawContact;

const UNNAMED: &str = "Unnamed contact";

/// `None` when the contact has no usable id.
pub fn anonymize(raw: RawContact, provider: &Provider, owner_id: Uuid) -> Option<Friend> {
  let external_id = raw.id.trim().to_owned();
  if external_id.is_empty() {
    return None;
  }

  let display_name = raw
    .name
    .as_deref()
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .unwrap_or(UNNAMED)
    .to_owned();

  let contact = match provider.method {
    IntegrationMethod::Deeplink => raw.phone.as_deref().and_then(normalise_phone).map(ContactChannel::Phone),
    _ if provider.requests_email() => raw.email.as_deref().and_then(normalise_email).map(ContactChannel::Email),
    _ => None,
  };

  Some(Friend {
    external_id,
    display_name,
    provider: provider.id.clone(),
    owner_id,
    contact,
  })
}

/// `+` followed by digits, or `None` if fewer than 6 digits remain.
fn normalise_phone(phone: &str) -> Option<String> {
  let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
  (digits.len() >= 6).then(|| format!("+{digits}"))
}

fn normalise_email(email: &str) -> Option<String> {
  let email = email.trim();
  let (local, domain) = email.split_once('@')?;
  (!local.is_empty() && domain.contains('.')).then(|| email.to_ascii_lowercase())
}
