//! Provider capability: authenticate, fetch a page of contacts, deliver an
//! invitation.
//!
//! [`Connector`] is the seam the importer talks to. [`HttpConnector`] is the
//! production implementation; it dispatches on the provider's
//! [`IntegrationMethod`](helpnet_core::provider::IntegrationMethod) to one
//! module per method.

mod bot;
mod deeplink;
mod federated;
mod http;
mod oauth2;
mod sdk;

use std::{future::Future, time::Duration};

use helpnet_core::{
  friend::Friend,
  provider::{IntegrationMethod, Provider},
};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub use self::http::HttpConnector;
use crate::vault::ProviderToken;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A failed provider call. Never leaves the crate unwrapped: the importer
/// maps it onto the pipeline's [`Error`](crate::Error).
#[derive(Debug, Error)]
pub enum ConnectorError {
  #[error("transport: {0}")]
  Transport(String),

  #[error("provider call timed out")]
  Timeout,

  #[error("throttled by provider")]
  Throttled { retry_after: Option<Duration> },

  #[error("provider returned {status}")]
  Upstream { status: u16 },

  #[error("rejected ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("not supported: {0}")]
  Unsupported(&'static str),

  #[error("unexpected response: {0}")]
  Protocol(String),
}

impl ConnectorError {
  /// Whether trying the same call again may succeed.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      Self::Transport(_) | Self::Timeout | Self::Throttled { .. } | Self::Upstream { .. }
    )
  }
}

impl From<reqwest::Error> for ConnectorError {
  fn from(e: reqwest::Error) -> Self {
    // Some endpoints carry credentials in the path.
    let e = e.without_url();
    if e.is_timeout() {
      Self::Timeout
    } else if e.is_decode() {
      Self::Protocol(e.to_string())
    } else {
      Self::Transport(e.to_string())
    }
  }
}

// ─── Authentication ──────────────────────────────────────────────────────────

/// Input of one authentication leg.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
  pub user_id:      Uuid,
  /// Signed `state` to round-trip through an authorization redirect.
  pub state:        &'a str,
  /// Authorization code returned by the provider, on the second leg.
  pub code:         Option<&'a str>,
  pub redirect_uri: &'a str,
}

#[derive(Debug)]
pub enum AuthOutcome {
  /// The user must visit this URL and come back with a code.
  Redirect { authorize_url: String },
  /// The handshake finished; persist this token.
  Token(ProviderToken),
}

// ─── Contacts ────────────────────────────────────────────────────────────────

/// A contact exactly as a provider returned it. Lives only until it is
/// anonymised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawContact {
  pub id:    String,
  pub name:  Option<String>,
  pub phone: Option<String>,
  pub email: Option<String>,
  /// Everything else the provider sent.
  pub extra: Map<String, Value>,
}

impl RawContact {
  /// Lenient mapping of a provider JSON object. Ids may be strings or
  /// numbers; objects without a usable id are skipped.
  pub fn from_json(value: Value) -> Option<Self> {
    let Value::Object(mut obj) = value else {
      return None;
    };

    let id = match obj.remove("id")? {
      Value::String(s) if !s.trim().is_empty() => s,
      Value::Number(n) => n.to_string(),
      _ => return None,
    };

    let mut take = |keys: &[&str]| -> Option<String> {
      keys.iter().find_map(|k| match obj.remove(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
      })
    };

    let name = take(&["name", "display_name", "full_name"]).or_else(|| {
      let first = take(&["first_name", "firstName"]);
      let last = take(&["last_name", "lastName"]);
      match (first, last) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (f, l) => f.or(l),
      }
    });
    let phone = take(&["phone", "phone_number"]);
    let email = take(&["email", "emailAddress"]);

    Some(Self { id, name, phone, email, extra: obj })
  }
}

/// One page of a provider's contact list.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
  pub contacts:    Vec<RawContact>,
  /// Absent on the last page.
  pub next_cursor: Option<String>,
}

// ─── Delivery ────────────────────────────────────────────────────────────────

/// How an invitation leaves the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRoute {
  /// Build an app link; the user's device does the sending.
  DeepLink,
  /// A direct message (bot chat, or e-mail channel of the contact).
  Direct,
  /// A post or message through the network's own API.
  Network,
}

impl DispatchRoute {
  pub fn for_invite(provider: &Provider, friend: &Friend) -> Self {
    match provider.method {
      IntegrationMethod::Deeplink => Self::DeepLink,
      IntegrationMethod::Bot => Self::Direct,
      _ if friend.email().is_some() => Self::Direct,
      _ => Self::Network,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Invitation<'a> {
  pub friend:  &'a Friend,
  pub message: &'a str,
  pub route:   DispatchRoute,
}

/// What a successful delivery produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
  /// Set when the invitation is a link for the user to open.
  pub deep_link: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait Connector: Send + Sync {
  /// One leg of the provider handshake.
  fn authenticate<'a>(
    &'a self,
    provider: &'a Provider,
    request: AuthRequest<'a>,
  ) -> impl Future<Output = Result<AuthOutcome, ConnectorError>> + Send + 'a;

  /// The page after `cursor` (the first page when `None`), at most
  /// `page_size` contacts.
  fn fetch_page<'a>(
    &'a self,
    provider: &'a Provider,
    token: &'a ProviderToken,
    cursor: Option<&'a str>,
    page_size: u32,
  ) -> impl Future<Output = Result<RawPage, ConnectorError>> + Send + 'a;

  /// Send one invitation. `token` is `None` for deep-link providers.
  fn deliver<'a>(
    &'a self,
    provider: &'a Provider,
    token: Option<&'a ProviderToken>,
    invitation: Invitation<'a>,
  ) -> impl Future<Output = Result<Delivery, ConnectorError>> + Send + 'a;
}
