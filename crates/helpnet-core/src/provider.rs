//! Social-network provider descriptions.
//!
//! A [`Provider`] is pure configuration: it names the network, says how the
//! platform integrates with it and how fast it may be called. Providers are
//! loaded once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Requests per minute assumed when a provider does not configure a limit.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Friends requested per page when a provider does not configure a size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// How the platform talks to a given network.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntegrationMethod {
  /// Standard authorization-code flow against the network's OAuth2 server.
  OAuth2,
  /// A messaging bot API authenticated with a platform-owned bot token.
  Bot,
  /// No API at all; invitations are handed off as a prefilled app link.
  Deeplink,
  /// An open federated protocol (ActivityPub) spoken against an instance.
  Federated,
  /// A vendor SDK reachable only through a local proxy.
  Sdk,
}

impl IntegrationMethod {
  /// Whether `connect` completes in two legs (redirect, then code exchange).
  pub fn uses_authorization_redirect(self) -> bool {
    matches!(self, Self::OAuth2 | Self::Federated)
  }
}

/// Rate-limit policy applied to every outbound call for a provider.
///
/// For bot providers the unit is messages per minute; for every other method
/// it is API requests per minute. The limiter treats both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
  pub per_minute: u32,
  /// Bucket capacity; defaults to `per_minute` when absent.
  #[serde(default)]
  pub burst:      Option<u32>,
}

impl Default for RateLimitPolicy {
  fn default() -> Self {
    Self { per_minute: DEFAULT_REQUESTS_PER_MINUTE, burst: None }
  }
}

impl RateLimitPolicy {
  pub fn per_minute(per_minute: u32) -> Self { Self { per_minute, burst: None } }

  pub fn capacity(&self) -> u32 { self.burst.unwrap_or(self.per_minute).max(1) }
}

/// Credentials the platform holds for a provider (client or bot identity).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
  #[serde(default)]
  pub client_id:     Option<String>,
  #[serde(default)]
  pub client_secret: Option<String>,
  #[serde(default)]
  pub bot_token:     Option<String>,
}

impl std::fmt::Debug for ProviderCredentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProviderCredentials")
      .field("client_id", &self.client_id)
      .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
      .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

/// A registered social network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
  pub id:           String,
  pub method:       IntegrationMethod,
  /// Base URL of the network's API (bot API, graph API, instance, proxy).
  #[serde(default)]
  pub api_url:      Option<String>,
  /// Authorization endpoint for redirect-based methods.
  #[serde(default)]
  pub auth_url:     Option<String>,
  /// Token endpoint used to exchange an authorization code.
  #[serde(default)]
  pub token_url:    Option<String>,
  /// Base of the app link used by deep-link providers (e.g. `https://wa.me`).
  #[serde(default)]
  pub link_base:    Option<String>,
  #[serde(default)]
  pub scope:        String,
  #[serde(default)]
  pub rate_limit:   RateLimitPolicy,
  #[serde(default = "default_page_size")]
  pub page_size:    u32,
  #[serde(default)]
  pub credentials:  ProviderCredentials,
}

fn default_page_size() -> u32 { DEFAULT_PAGE_SIZE }

impl Provider {
  /// A provider with only its identity and method set; everything else takes
  /// defaults.
  pub fn new(id: impl Into<String>, method: IntegrationMethod) -> Self {
    Self {
      id: id.into(),
      method,
      api_url: None,
      auth_url: None,
      token_url: None,
      link_base: None,
      scope: String::new(),
      rate_limit: RateLimitPolicy::default(),
      page_size: DEFAULT_PAGE_SIZE,
      credentials: ProviderCredentials::default(),
    }
  }

  /// Whether the scope asks the network for e-mail addresses.
  pub fn requests_email(&self) -> bool {
    self
      .scope
      .split([',', ' '])
      .any(|s| s.trim().to_ascii_lowercase().contains("email"))
  }
}
