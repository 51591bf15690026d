//! Messaging-bot providers (Telegram Bot API shape).
//!
//! The platform's bot token authenticates every call; the per-user session
//! only records which bot the user linked with. Contacts are the people who
//! have messaged the bot.

use std::collections::BTreeSet;

use helpnet_core::provider::Provider;
use serde_json::{Value, json};
use url::Url;

use super::{
  AuthOutcome, ConnectorError, Delivery, Invitation, RawContact, RawPage,
  http::{endpoint, send_json},
};
use crate::vault::ProviderToken;

fn method_url(provider: &Provider, method: &str) -> Result<Url, ConnectorError> {
  let token = provider
    .credentials
    .bot_token
    .as_deref()
    .ok_or_else(|| ConnectorError::Protocol(format!("no bot token configured for {}", provider.id)))?;
  endpoint(provider.api_url.as_deref(), &format!("bot{token}/{method}"))
}

/// Unwrap `{"ok": true, "result": ...}`.
fn result(mut body: Value) -> Result<Value, ConnectorError> {
  if body.get("ok").and_then(Value::as_bool) == Some(true) {
    return Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null));
  }
  let message = body
    .get("description")
    .and_then(Value::as_str)
    .unwrap_or("bot api refused the call")
    .to_owned();
  Err(ConnectorError::Rejected { status: 200, message })
}

pub(super) async fn authenticate(
  client: &reqwest::Client,
  provider: &Provider,
) -> Result<AuthOutcome, ConnectorError> {
  let me = result(send_json(client.get(method_url(provider, "getMe")?)).await?)?;
  let username = me
    .get("username")
    .and_then(Value::as_str)
    .ok_or_else(|| ConnectorError::Protocol("getMe returned no username".into()))?;
  Ok(AuthOutcome::Token(ProviderToken::new(format!("bot:{username}"))))
}

/// One page of `getUpdates`. The cursor is the next update offset.
pub(super) async fn fetch_page(
  client: &reqwest::Client,
  provider: &Provider,
  cursor: Option<&str>,
  page_size: u32,
) -> Result<RawPage, ConnectorError> {
  let mut url = method_url(provider, "getUpdates")?;
  {
    let mut query = url.query_pairs_mut();
    query.append_pair("limit", &page_size.to_string());
    if let Some(offset) = cursor {
      query.append_pair("offset", offset);
    }
  }

  let updates = match result(send_json(client.get(url)).await?)? {
    Value::Array(updates) => updates,
    _ => return Err(ConnectorError::Protocol("getUpdates result is not a list".into())),
  };

  let update_count = updates.len();
  let last_update = updates.iter().filter_map(|u| u.get("update_id")?.as_i64()).max();
  let mut seen = BTreeSet::new();
  let contacts = updates
    .into_iter()
    .filter_map(|mut u| u.get_mut("message")?.get_mut("from").map(Value::take))
    .filter_map(RawContact::from_json)
    .filter(|c| seen.insert(c.id.clone()))
    .collect();

  // A full page means more updates may be waiting.
  let has_more = usize::try_from(page_size).is_ok_and(|size| size > 0 && update_count >= size);
  let next_cursor = last_update.filter(|_| has_more).map(|id| (id + 1).to_string());

  Ok(RawPage { contacts, next_cursor })
}

pub(super) async fn deliver(
  client: &reqwest::Client,
  provider: &Provider,
  invitation: &Invitation<'_>,
) -> Result<Delivery, ConnectorError> {
  let body = json!({
    "chat_id": invitation.friend.external_id,
    "text": invitation.message,
  });
  result(send_json(client.post(method_url(provider, "sendMessage")?).json(&body)).await?)?;
  Ok(Delivery::default())
}

#[cfg(test)]
mod tests {
  use helpnet_core::{friend::Friend, provider::IntegrationMethod};
  use uuid::Uuid;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path, query_param},
  };

  use super::*;
  use crate::connector::DispatchRoute;

  fn provider(server: &MockServer) -> Provider {
    let mut p = Provider::new("telegram", IntegrationMethod::Bot);
    p.api_url = Some(server.uri());
    p.credentials.bot_token = Some("123:abc".into());
    p
  }

  #[tokio::test]
  async fn get_me_links_the_bot() {
    let server = MockServer::start().await;
    Mock::given(path("/bot123:abc/getMe"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": { "id": 1, "is_bot": true, "username": "helpnet_bot" }
      })))
      .mount(&server)
      .await;

    let AuthOutcome::Token(token) = authenticate(&reqwest::Client::new(), &provider(&server))
      .await
      .unwrap()
    else {
      panic!("expected a token");
    };
    assert_eq!(token.access_token(), "bot:helpnet_bot");
    assert!(token.expires_at().is_none());
  }

  #[tokio::test]
  async fn updates_become_unique_senders() {
    let server = MockServer::start().await;
    Mock::given(path("/bot123:abc/getUpdates"))
      .and(query_param("limit", "2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": [
          { "update_id": 10, "message": { "from": { "id": 7, "first_name": "Ann" } } },
          { "update_id": 11, "message": { "from": { "id": 8, "first_name": "Bob" } } }
        ]
      })))
      .mount(&server)
      .await;

    let page = fetch_page(&reqwest::Client::new(), &provider(&server), None, 2).await.unwrap();
    let ids: Vec<&str> = page.contacts.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["7", "8"]);
    assert_eq!(page.next_cursor.as_deref(), Some("12"));
  }

  #[tokio::test]
  async fn short_page_ends_the_listing() {
    let server = MockServer::start().await;
    Mock::given(path("/bot123:abc/getUpdates"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": [ { "update_id": 3, "message": { "from": { "id": 9, "first_name": "Cy" } } } ]
      })))
      .mount(&server)
      .await;

    let page = fetch_page(&reqwest::Client::new(), &provider(&server), Some("3"), 50).await.unwrap();
    assert_eq!(page.contacts.len(), 1);
    assert!(page.next_cursor.is_none());
  }

  #[tokio::test]
  async fn refused_send_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/bot123:abc/sendMessage"))
      .and(body_partial_json(json!({ "chat_id": "7" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "ok": false,
        "description": "Forbidden: bot was blocked by the user"
      })))
      .mount(&server)
      .await;

    let friend = Friend {
      external_id:  "7".into(),
      display_name: "Ann".into(),
      provider:     "telegram".into(),
      owner_id:     Uuid::nil(),
      contact:      None,
    };
    let invitation = Invitation { friend: &friend, message: "hi", route: DispatchRoute::Direct };
    let err = deliver(&reqwest::Client::new(), &provider(&server), &invitation).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Rejected { message, .. } if message.contains("blocked")));
  }
}
