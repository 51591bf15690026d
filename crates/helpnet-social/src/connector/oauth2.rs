//! Authorization-code flow and graph-style delivery.

use chrono::{Duration, Utc};
use helpnet_core::provider::Provider;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{
  AuthOutcome, AuthRequest, ConnectorError, Delivery, DispatchRoute, Invitation,
  http::{endpoint, send_json},
};
use crate::vault::ProviderToken;

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token:  String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in:    Option<i64>,
}

pub(super) async fn authenticate(
  client: &reqwest::Client,
  provider: &Provider,
  request: AuthRequest<'_>,
) -> Result<AuthOutcome, ConnectorError> {
  match request.code {
    None => {
      let url = authorize_url(provider, provider.auth_url.as_deref(), &request)?;
      Ok(AuthOutcome::Redirect { authorize_url: url.into() })
    }
    Some(code) => {
      exchange_code(client, provider, provider.token_url.as_deref(), code, request.redirect_uri)
        .await
        .map(AuthOutcome::Token)
    }
  }
}

/// The URL the user is sent to in order to approve access.
pub(super) fn authorize_url(
  provider: &Provider,
  auth_url: Option<&str>,
  request: &AuthRequest<'_>,
) -> Result<Url, ConnectorError> {
  let auth_url = auth_url
    .ok_or_else(|| ConnectorError::Protocol("no authorization endpoint configured".into()))?;
  let client_id = client_id(provider)?;

  let mut url = Url::parse(auth_url)
    .map_err(|e| ConnectorError::Protocol(format!("bad authorization endpoint: {e}")))?;
  {
    let mut query = url.query_pairs_mut();
    query
      .append_pair("response_type", "code")
      .append_pair("client_id", client_id)
      .append_pair("redirect_uri", request.redirect_uri)
      .append_pair("state", request.state);
    if !provider.scope.is_empty() {
      query.append_pair("scope", &provider.scope);
    }
  }
  Ok(url)
}

/// Trade an authorization code for an access token.
pub(super) async fn exchange_code(
  client: &reqwest::Client,
  provider: &Provider,
  token_url: Option<&str>,
  code: &str,
  redirect_uri: &str,
) -> Result<ProviderToken, ConnectorError> {
  let token_url = token_url
    .ok_or_else(|| ConnectorError::Protocol("no token endpoint configured".into()))?;
  let url = Url::parse(token_url)
    .map_err(|e| ConnectorError::Protocol(format!("bad token endpoint: {e}")))?;

  let mut form = vec![
    ("grant_type", "authorization_code"),
    ("code", code),
    ("redirect_uri", redirect_uri),
    ("client_id", client_id(provider)?),
  ];
  if let Some(secret) = provider.credentials.client_secret.as_deref() {
    form.push(("client_secret", secret));
  }

  let body = send_json(client.post(url).form(&form)).await?;
  let response: TokenResponse =
    serde_json::from_value(body).map_err(|e| ConnectorError::Protocol(e.to_string()))?;

  let mut token = ProviderToken::new(response.access_token);
  if let Some(refresh) = response.refresh_token {
    token = token.with_refresh(refresh);
  }
  if let Some(secs) = response.expires_in.filter(|s| *s > 0) {
    token = token.expiring_at(Utc::now() + Duration::seconds(secs));
  }
  Ok(token)
}

fn client_id(provider: &Provider) -> Result<&str, ConnectorError> {
  provider
    .credentials
    .client_id
    .as_deref()
    .ok_or_else(|| ConnectorError::Protocol(format!("no client id configured for {}", provider.id)))
}

/// `POST {api}/messages`, addressed to the contact's e-mail on the direct
/// route and to their network id otherwise.
pub(super) async fn deliver(
  client: &reqwest::Client,
  provider: &Provider,
  token: &ProviderToken,
  invitation: &Invitation<'_>,
) -> Result<Delivery, ConnectorError> {
  let url = endpoint(provider.api_url.as_deref(), "messages")?;
  let body = match (invitation.route, invitation.friend.email()) {
    (DispatchRoute::Direct, Some(email)) => json!({
      "channel": "email",
      "to": email,
      "message": invitation.message,
    }),
    _ => json!({
      "channel": "network",
      "to": invitation.friend.external_id,
      "message": invitation.message,
    }),
  };

  send_json(client.post(url).bearer_auth(token.access_token()).json(&body)).await?;
  Ok(Delivery::default())
}
