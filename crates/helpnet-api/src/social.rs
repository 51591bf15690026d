//! Handlers for the social-import endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/providers` | Registered providers, credentials omitted |
//! | `GET`    | `/users/:user_id/consents/:provider` | `{"granted":bool}` |
//! | `PUT`    | `/users/:user_id/consents/:provider` | Grant; 404 for unknown providers |
//! | `DELETE` | `/users/:user_id/consents/:provider` | Revoke and drop the stored token |
//! | `POST`   | `/users/:user_id/connections/:provider` | Body: `{"code"?, "state"?}` |
//! | `DELETE` | `/users/:user_id/connections/:provider` | Forget the token |
//! | `GET`    | `/connect/callback` | Provider redirect target: `?code&state` |
//! | `POST`   | `/users/:user_id/imports/:provider` | Body: `{"limit"?}` |
//! | `GET`    | `/users/:user_id/invite-allowance` | Anti-spam evaluation |
//! | `POST`   | `/invites` | Body: `{"friend", "template"}` |
//! | `POST`   | `/invites/batch` | Body: `{"friends", "template"?}`; stops at the first block |
//! | `GET`    | `/invites/:token` | Signature and expiry check |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use helpnet_core::{
  consent::ConsentRecord,
  friend::Friend,
  metrics::{BlockReason, InviteAllowance},
  provider::{IntegrationMethod, RateLimitPolicy},
};
use helpnet_social::{
  cancel::CancelSignal,
  importer::{ConnectOutcome, ImportReport, InviteBatch, InviteReceipt},
  vault::InviteVerification,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{AppState, Stack, error::ApiError};

/// Friends returned by one import when the caller gives no limit.
pub const DEFAULT_IMPORT_LIMIT: usize = 500;
/// Upper bound on a single import.
pub const MAX_IMPORT_LIMIT: usize = 5000;
/// Upper bound on the friends of one invitation batch.
pub const MAX_INVITE_BATCH: usize = 200;

// ─── Providers ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProviderView {
  pub id:         String,
  pub method:     IntegrationMethod,
  pub scope:      String,
  pub rate_limit: RateLimitPolicy,
  pub page_size:  u32,
}

/// `GET /providers`
pub async fn providers<T: Stack>(State(state): State<AppState<T>>) -> Json<Vec<ProviderView>> {
  let views = state
    .importer
    .registry()
    .list()
    .map(|p| ProviderView {
      id:         p.id.clone(),
      method:     p.method,
      scope:      p.scope.clone(),
      rate_limit: p.rate_limit,
      page_size:  p.page_size,
    })
    .collect();
  Json(views)
}

// ─── Consent ──────────────────────────────────────────────────────────────────

/// `GET /users/:user_id/consents/:provider`
pub async fn consent_status<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
  let granted = state.importer.consent().check_consent(user_id, &provider).await?;
  Ok(Json(json!({ "granted": granted })))
}

/// `PUT /users/:user_id/consents/:provider`
pub async fn grant_consent<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<ConsentRecord>, ApiError> {
  state.importer.registry().get(&provider)?;
  let record = state.importer.consent().grant(user_id, &provider).await?;
  Ok(Json(record))
}

/// `DELETE /users/:user_id/consents/:provider`
pub async fn revoke_consent<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
  let revoked = state.importer.revoke_consent(&provider, user_id).await?;
  Ok(Json(json!({ "revoked": revoked })))
}

// ─── Connections ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
  pub code:  Option<String>,
  pub state: Option<String>,
}

/// `POST /users/:user_id/connections/:provider`
///
/// Without a code, redirect-based providers answer with
/// `{"status":"redirect","authorize_url":...}`.
pub async fn connect<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
  Json(body): Json<ConnectBody>,
) -> Result<Json<ConnectOutcome>, ApiError> {
  let outcome = state
    .importer
    .connect(&provider, user_id, body.code.as_deref(), body.state.as_deref())
    .await?;
  Ok(Json(outcome))
}

/// `DELETE /users/:user_id/connections/:provider`
pub async fn disconnect<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<Value>, ApiError> {
  let removed = state.importer.disconnect(&provider, user_id).await?;
  Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
  pub code:  Option<String>,
  pub state: Option<String>,
  /// Set by providers when the user declined.
  pub error: Option<String>,
}

/// `GET /connect/callback?code=...&state=...`
///
/// The signed state names the user and provider the flow was started for.
pub async fn callback<T: Stack>(
  State(state): State<AppState<T>>,
  Query(params): Query<CallbackParams>,
) -> Result<Json<ConnectOutcome>, ApiError> {
  let signed = params.state.as_deref().unwrap_or_default();
  let (user_id, provider) = state
    .importer
    .vault()
    .state_owner(signed)
    .ok_or_else(|| ApiError::BadRequest("authorization state is missing or expired".into()))?;

  let failed = |reason: String| helpnet_social::Error::AuthFlowFailed { provider_id: provider.clone(), reason };
  if let Some(error) = params.error {
    return Err(failed(format!("provider reported {error}")).into());
  }
  let code = params.code.ok_or_else(|| failed("no authorization code".into()))?;

  let outcome = state.importer.connect(&provider, user_id, Some(&code), Some(signed)).await?;
  Ok(Json(outcome))
}

// ─── Import ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ImportBody {
  pub limit: Option<usize>,
}

/// `POST /users/:user_id/imports/:provider`
///
/// Dropping the connection drops the import with it.
pub async fn import<T: Stack>(
  State(state): State<AppState<T>>,
  Path((user_id, provider)): Path<(Uuid, String)>,
  Json(body): Json<ImportBody>,
) -> Result<Json<ImportReport>, ApiError> {
  let limit = body.limit.unwrap_or(DEFAULT_IMPORT_LIMIT);
  if limit > MAX_IMPORT_LIMIT {
    return Err(ApiError::BadRequest(format!("limit may not exceed {MAX_IMPORT_LIMIT}")));
  }
  let report = state
    .importer
    .import_friends(&provider, user_id, limit, &CancelSignal::never())
    .await?;
  Ok(Json(report))
}

// ─── Invitations ──────────────────────────────────────────────────────────────

/// `GET /users/:user_id/invite-allowance`
pub async fn allowance<T: Stack>(
  State(state): State<AppState<T>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<InviteAllowance>, ApiError> {
  Ok(Json(state.importer.antispam().can_invite(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct InviteBody {
  pub friend:   Friend,
  /// May contain `{token}` and `{name}` placeholders.
  pub template: String,
}

/// `POST /invites`
pub async fn send_invite<T: Stack>(
  State(state): State<AppState<T>>,
  Json(body): Json<InviteBody>,
) -> Result<Json<InviteReceipt>, ApiError> {
  let receipt = state.importer.send_invite(&body.friend, &body.template).await?;
  Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
pub struct BatchBody {
  pub friends:  Vec<Friend>,
  /// Falls back to the built-in invitation text.
  #[serde(default)]
  pub template: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchEntryView {
  pub external_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub receipt:     Option<InviteReceipt>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:       Option<&'static str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message:     Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchView {
  pub sent:      usize,
  pub remaining: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub blocked:   Option<BlockReason>,
  pub results:   Vec<BatchEntryView>,
}

impl From<InviteBatch> for BatchView {
  fn from(batch: InviteBatch) -> Self {
    let sent = batch.sent();
    let results = batch
      .entries
      .into_iter()
      .map(|entry| match entry.outcome {
        Ok(receipt) => BatchEntryView {
          external_id: entry.external_id,
          receipt:     Some(receipt),
          error:       None,
          message:     None,
        },
        Err(e) => BatchEntryView {
          external_id: entry.external_id,
          receipt:     None,
          error:       Some(e.kind()),
          message:     Some(e.to_string()),
        },
      })
      .collect();
    Self { sent, remaining: batch.remaining, blocked: batch.blocked, results }
  }
}

/// `POST /invites/batch`
pub async fn send_batch<T: Stack>(
  State(state): State<AppState<T>>,
  Json(body): Json<BatchBody>,
) -> Result<Json<BatchView>, ApiError> {
  if body.friends.len() > MAX_INVITE_BATCH {
    return Err(ApiError::BadRequest(format!("a batch may not exceed {MAX_INVITE_BATCH} friends")));
  }
  let batch = state
    .importer
    .send_invites(&body.friends, body.template.as_deref(), &CancelSignal::never())
    .await;
  Ok(Json(batch.into()))
}

/// `GET /invites/:token`
pub async fn verify_invite<T: Stack>(
  State(state): State<AppState<T>>,
  Path(token): Path<String>,
) -> Json<InviteVerification> {
  Json(state.importer.vault().verify_invite_token(&token))
}
