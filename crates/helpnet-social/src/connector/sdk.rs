//! Providers only reachable through a vendor SDK, fronted by a local proxy
//! that speaks plain JSON over HTTP.

use chrono::{Duration, Utc};
use helpnet_core::provider::Provider;
use serde::Deserialize;
use serde_json::json;

use super::{
  AuthOutcome, AuthRequest, ConnectorError, Delivery, Invitation,
  http::{endpoint, send_json},
};
use crate::vault::ProviderToken;

#[derive(Debug, Deserialize)]
struct Session {
  token:      String,
  #[serde(default)]
  expires_in: Option<i64>,
}

/// `POST {proxy}/session`; the proxy runs the vendor handshake.
pub(super) async fn authenticate(
  client: &reqwest::Client,
  provider: &Provider,
  request: AuthRequest<'_>,
) -> Result<AuthOutcome, ConnectorError> {
  let url = endpoint(provider.api_url.as_deref(), "session")?;
  let body = json!({ "user_id": request.user_id, "code": request.code });
  let session: Session = serde_json::from_value(send_json(client.post(url).json(&body)).await?)
    .map_err(|e| ConnectorError::Protocol(e.to_string()))?;

  let mut token = ProviderToken::new(session.token);
  if let Some(secs) = session.expires_in.filter(|s| *s > 0) {
    token = token.expiring_at(Utc::now() + Duration::seconds(secs));
  }
  Ok(AuthOutcome::Token(token))
}

/// `POST {proxy}/invite`.
pub(super) async fn deliver(
  client: &reqwest::Client,
  provider: &Provider,
  token: &ProviderToken,
  invitation: &Invitation<'_>,
) -> Result<Delivery, ConnectorError> {
  let url = endpoint(provider.api_url.as_deref(), "invite")?;
  let body = json!({ "to": invitation.friend.external_id, "message": invitation.message });
  send_json(client.post(url).bearer_auth(token.access_token()).json(&body)).await?;
  Ok(Delivery::default())
}
