//! The provider catalogue.
//!
//! Written while the host application starts up, then shared read-only
//! (typically behind an `Arc`).

use std::collections::BTreeMap;

use helpnet_core::provider::{IntegrationMethod, Provider, RateLimitPolicy};

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
  providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
  pub fn new() -> Self { Self::default() }

  /// A registry pre-loaded with the networks the platform ships support for.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    for provider in default_providers() {
      registry.register(provider.id.clone(), provider);
    }
    registry
  }

  /// Store `provider` under `id`, replacing any previous entry.
  pub fn register(&mut self, id: impl Into<String>, mut provider: Provider) {
    let id = id.into();
    provider.id.clone_from(&id);
    if let Some(previous) = self.providers.insert(id, provider) {
      tracing::debug!(provider = %previous.id, "provider configuration replaced");
    }
  }

  pub fn get(&self, id: &str) -> Result<&Provider> {
    self
      .providers
      .get(id)
      .ok_or_else(|| Error::UnknownProvider(id.to_owned()))
  }

  /// All providers, ordered by id.
  pub fn list(&self) -> impl Iterator<Item = &Provider> { self.providers.values() }

  pub fn len(&self) -> usize { self.providers.len() }

  pub fn is_empty(&self) -> bool { self.providers.is_empty() }
}

fn default_providers() -> Vec<Provider> {
  let mut facebook = Provider::new("facebook", IntegrationMethod::OAuth2);
  facebook.auth_url = Some("https://www.facebook.com/v18.0/dialog/oauth".into());
  facebook.token_url = Some("https://graph.facebook.com/v18.0/oauth/access_token".into());
  facebook.api_url = Some("https://graph.facebook.com/v18.0".into());
  facebook.scope = "user_friends,email".into();

  let mut linkedin = Provider::new("linkedin", IntegrationMethod::OAuth2);
  linkedin.auth_url = Some("https://www.linkedin.com/oauth/v2/authorization".into());
  linkedin.token_url = Some("https://www.linkedin.com/oauth/v2/accessToken".into());
  linkedin.api_url = Some("https://api.linkedin.com/v2".into());
  linkedin.scope = "r_liteprofile r_emailaddress".into();

  let mut telegram = Provider::new("telegram", IntegrationMethod::Bot);
  telegram.api_url = Some("https://api.telegram.org".into());
  telegram.rate_limit = RateLimitPolicy::per_minute(30);

  let mut whatsapp = Provider::new("whatsapp", IntegrationMethod::Deeplink);
  whatsapp.link_base = Some("https://wa.me".into());

  let mut mastodon = Provider::new("mastodon", IntegrationMethod::Federated);
  mastodon.api_url = Some("https://mastodon.social".into());
  mastodon.scope = "read:follows write:statuses".into();

  let mut wechat = Provider::new("wechat", IntegrationMethod::Sdk);
  wechat.api_url = Some("http://127.0.0.1:8787/wechat".into());

  vec![facebook, linkedin, telegram, whatsapp, mastodon, wechat]
}
