//! The `reqwest`-backed connector and the plumbing its per-method modules
//! share.

use std::{future::Future, time::Duration};

use helpnet_core::provider::{IntegrationMethod, Provider};
use reqwest::{RequestBuilder, StatusCode, header::RETRY_AFTER};
use serde_json::Value;
use url::Url;

use super::{
  AuthOutcome, AuthRequest, Connector, ConnectorError, Delivery, Invitation, RawContact, RawPage,
  bot, deeplink, federated, oauth2, sdk,
};
use crate::vault::ProviderToken;

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
  client: reqwest::Client,
}

impl HttpConnector {
  pub fn new(client: reqwest::Client) -> Self { Self { client } }
}

impl Connector for HttpConnector {
  fn authenticate<'a>(
    &'a self,
    provider: &'a Provider,
    request: AuthRequest<'a>,
  ) -> impl Future<Output = Result<AuthOutcome, ConnectorError>> + Send + 'a {
    async move {
      match provider.method {
        IntegrationMethod::OAuth2 => oauth2::authenticate(&self.client, provider, request).await,
        IntegrationMethod::Bot => bot::authenticate(&self.client, provider).await,
        IntegrationMethod::Deeplink => deeplink::authenticate(provider),
        IntegrationMethod::Federated => {
          federated::authenticate(&self.client, provider, request).await
        }
        IntegrationMethod::Sdk => sdk::authenticate(&self.client, provider, request).await,
      }
    }
  }

  fn fetch_page<'a>(
    &'a self,
    provider: &'a Provider,
    token: &'a ProviderToken,
    cursor: Option<&'a str>,
    page_size: u32,
  ) -> impl Future<Output = Result<RawPage, ConnectorError>> + Send + 'a {
    async move {
      match provider.method {
        IntegrationMethod::OAuth2 | IntegrationMethod::Sdk => {
          fetch_friends(&self.client, provider, token, cursor, page_size).await
        }
        IntegrationMethod::Bot => bot::fetch_page(&self.client, provider, cursor, page_size).await,
        IntegrationMethod::Deeplink => Err(ConnectorError::Unsupported(
          "deep-link providers expose no contact list",
        )),
        IntegrationMethod::Federated => {
          federated::fetch_page(&self.client, provider, token, cursor, page_size).await
        }
      }
    }
  }

  fn deliver<'a>(
    &'a self,
    provider: &'a Provider,
    token: Option<&'a ProviderToken>,
    invitation: Invitation<'a>,
  ) -> impl Future<Output = Result<Delivery, ConnectorError>> + Send + 'a {
    async move {
      match provider.method {
        IntegrationMethod::Deeplink => deeplink::deliver(provider, &invitation),
        IntegrationMethod::Bot => bot::deliver(&self.client, provider, &invitation).await,
        method => {
          let token = token.ok_or_else(|| {
            ConnectorError::Protocol(format!("{method} delivery needs a session token"))
          })?;
          match method {
            IntegrationMethod::Federated => {
              federated::deliver(&self.client, provider, token, &invitation).await
            }
            IntegrationMethod::Sdk => sdk::deliver(&self.client, provider, token, &invitation).await,
            _ => oauth2::deliver(&self.client, provider, token, &invitation).await,
          }
        }
      }
    }
  }
}

// ─── Shared plumbing ─────────────────────────────────────────────────────────

/// `base` + `path`, keeping any path already on `base`.
pub(super) fn endpoint(base: Option<&str>, path: &str) -> Result<Url, ConnectorError> {
  let base =
    base.ok_or_else(|| ConnectorError::Protocol("provider has no endpoint configured".into()))?;
  let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
  Url::parse(&joined).map_err(|e| ConnectorError::Protocol(format!("bad endpoint {joined}: {e}")))
}

/// Send a request and decode its JSON body, classifying failures.
pub(super) async fn send_json(request: RequestBuilder) -> Result<Value, ConnectorError> {
  let response = request.send().await?;
  let status = response.status();

  if status == StatusCode::TOO_MANY_REQUESTS {
    let retry_after = response
      .headers()
      .get(RETRY_AFTER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.trim().parse::<u64>().ok())
      .map(Duration::from_secs);
    return Err(ConnectorError::Throttled { retry_after });
  }
  if status.is_server_error() {
    return Err(ConnectorError::Upstream { status: status.as_u16() });
  }
  if !status.is_success() {
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
      let cut = (0..=MAX_ERROR_BODY).rev().find(|i| message.is_char_boundary(*i)).unwrap_or(0);
      message.truncate(cut);
    }
    return Err(ConnectorError::Rejected { status: status.as_u16(), message });
  }

  if status == StatusCode::NO_CONTENT {
    return Ok(Value::Null);
  }
  Ok(response.json::<Value>().await?)
}

/// Map a JSON array of contact objects; entries without an id are dropped.
pub(super) fn contacts_from(value: Option<Value>) -> Vec<RawContact> {
  match value {
    Some(Value::Array(items)) => items.into_iter().filter_map(RawContact::from_json).collect(),
    _ => Vec::new(),
  }
}

/// The conventional `GET {api}/friends?count=&cursor=` listing shared by
/// graph-style APIs and the SDK proxy. Responses look like
/// `{"data": [...], "nextCursor": "..."}`.
pub(super) async fn fetch_friends(
  client: &reqwest::Client,
  provider: &Provider,
  token: &ProviderToken,
  cursor: Option<&str>,
  page_size: u32,
) -> Result<RawPage, ConnectorError> {
  let mut url = endpoint(provider.api_url.as_deref(), "friends")?;
  {
    let mut query = url.query_pairs_mut();
    query.append_pair("count", &page_size.to_string());
    if let Some(cursor) = cursor {
      query.append_pair("cursor", cursor);
    }
  }

  let mut body = send_json(client.get(url).bearer_auth(token.access_token())).await?;
  let contacts = contacts_from(body.get_mut("data").map(Value::take));
  let next_cursor = ["nextCursor", "next_cursor"]
    .iter()
    .find_map(|k| body.get(*k).and_then(Value::as_str))
    .filter(|c| !c.is_empty())
    .map(str::to_owned);

  Ok(RawPage { contacts, next_cursor })
}
