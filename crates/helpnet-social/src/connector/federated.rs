//! Federated providers spoken to through a Mastodon-compatible instance API.
//!
//! Contacts are the accounts the user follows, identified by their `acct`
//! handle so an invitation can mention them directly.

use helpnet_core::provider::Provider;
use serde_json::{Value, json};

use super::{
  AuthOutcome, AuthRequest, ConnectorError, Delivery, Invitation, RawPage,
  http::{contacts_from, endpoint, send_json},
  oauth2,
};
use crate::vault::ProviderToken;

pub(super) async fn authenticate(
  client: &reqwest::Client,
  provider: &Provider,
  request: AuthRequest<'_>,
) -> Result<AuthOutcome, ConnectorError> {
  let api = provider.api_url.as_deref();
  match request.code {
    None => {
      let default = endpoint(api, "oauth/authorize")?;
      let auth_url = provider.auth_url.as_deref().unwrap_or(default.as_str());
      let url = oauth2::authorize_url(provider, Some(auth_url), &request)?;
      Ok(AuthOutcome::Redirect { authorize_url: url.into() })
    }
    Some(code) => {
      let default = endpoint(api, "oauth/token")?;
      let token_url = provider.token_url.as_deref().unwrap_or(default.as_str());
      oauth2::exchange_code(client, provider, Some(token_url), code, request.redirect_uri)
        .await
        .map(AuthOutcome::Token)
    }
  }
}

/// Cursor form: `<account id>:<max id>`, so later pages skip the
/// credentials lookup.
pub(super) async fn fetch_page(
  client: &reqwest::Client,
  provider: &Provider,
  token: &ProviderToken,
  cursor: Option<&str>,
  page_size: u32,
) -> Result<RawPage, ConnectorError> {
  let api = provider.api_url.as_deref();

  let (account_id, max_id) = match cursor.and_then(|c| c.split_once(':')) {
    Some((account, max)) => (account.to_owned(), Some(max)),
    None => {
      let me = send_json(
        client
          .get(endpoint(api, "api/v1/accounts/verify_credentials")?)
          .bearer_auth(token.access_token()),
      )
      .await?;
      let id = me
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::Protocol("verify_credentials returned no id".into()))?;
      (id.to_owned(), None)
    }
  };

  let mut url = endpoint(api, &format!("api/v1/accounts/{account_id}/following"))?;
  {
    let mut query = url.query_pairs_mut();
    query.append_pair("limit", &page_size.to_string());
    if let Some(max_id) = max_id {
      query.append_pair("max_id", max_id);
    }
  }

  let accounts = match send_json(client.get(url).bearer_auth(token.access_token())).await? {
    Value::Array(accounts) => accounts,
    _ => return Err(ConnectorError::Protocol("following is not a list".into())),
  };

  let full = usize::try_from(page_size).is_ok_and(|size| size > 0 && accounts.len() >= size);
  let next_cursor = accounts
    .last()
    .and_then(|a| a.get("id"))
    .and_then(Value::as_str)
    .filter(|_| full)
    .map(|last| format!("{account_id}:{last}"));

  let keyed_by_handle = accounts
    .into_iter()
    .filter_map(|mut account| {
      let acct = account.get("acct")?.as_str()?.to_owned();
      let obj = account.as_object_mut()?;
      obj.insert("id".into(), Value::String(acct));
      Some(account)
    })
    .collect();

  Ok(RawPage { contacts: contacts_from(Some(Value::Array(keyed_by_handle))), next_cursor })
}

/// A direct-visibility status mentioning the contact.
pub(super) async fn deliver(
  client: &reqwest::Client,
  provider: &Provider,
  token: &ProviderToken,
  invitation: &Invitation<'_>,
) -> Result<Delivery, ConnectorError> {
  let url = endpoint(provider.api_url.as_deref(), "api/v1/statuses")?;
  let body = json!({
    "status": format!("@{} {}", invitation.friend.external_id, invitation.message),
    "visibility": "direct",
  });
  send_json(client.post(url).bearer_auth(token.access_token()).json(&body)).await?;
  Ok(Delivery::default())
}
