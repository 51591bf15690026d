//! The social importer: connect to a provider, page through a user's
//! contacts, send invitations.
//!
//! Each call is an independent operation with its own phase machine; the
//! only state shared between operations is the rate limiter.


use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use helpnet_core::{
  friend::{Friend, InviteRecord},
  metrics::{AntiSpamPolicy, BlockReason},
  provider::Provider,
  store::{ConsentStore, MetricsStore, TokenStore},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  anonymize::anonymize,
  antispam::AntiSpamGate,
  cancel::CancelSignal,
  connector::{AuthOutcome, AuthRequest, Connector, ConnectorError, DispatchRoute, Invitation, RawPage},
  consent::ConsentGate,
  rate_limit::{DEFAULT_MAX_WAIT, RateLimiter},
  registry::ProviderRegistry,
  vault::{self, DEFAULT_INVITE_TTL_DAYS, SecureTokenStore},
};

/// Invitation text used by [`SocialImporter::send_invites`] when the caller
/// brings none.
pub const DEFAULT_INVITE_TEMPLATE: &str = "Hi {name}, I'm moving to HelpNet to turn our conversations \
  into real mutual aid. Join me: https://helpnet.org/invite/{token}";

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ImportSettings {
  /// Pause between two pages of one import.
  pub page_delay:          Duration,
  /// Attempts per page, the first one included.
  pub max_attempts:        u32,
  /// First retry delay; doubles on every further retry.
  pub backoff_base:        Duration,
  /// Bound on any single provider call.
  pub call_timeout:        Duration,
  pub rate_limit_max_wait: Duration,
  pub invite_ttl:          chrono::Duration,
  /// Pause between two invitations of one batch.
  pub invite_delay:        Duration,
  /// Where providers send the user back after authorizing.
  pub redirect_uri:        String,
  pub antispam:            AntiSpamPolicy,
}

impl Default for ImportSettings {
  fn default() -> Self {
    Self {
      page_delay:          Duration::from_secs(1),
      max_attempts:        3,
      backoff_base:        Duration::from_millis(500),
      call_timeout:        Duration::from_secs(15),
      rate_limit_max_wait: DEFAULT_MAX_WAIT,
      invite_ttl:          chrono::Duration::days(DEFAULT_INVITE_TTL_DAYS),
      invite_delay:        Duration::from_secs(2),
      redirect_uri:        "http://localhost:8080/connect/callback".into(),
      antispam:            AntiSpamPolicy::default(),
    }
  }
}

// ─── Operation phases ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
  Idle,
  Authenticating,
  Authenticated,
  Paging,
  Completed,
  Failed,
}

impl ImportPhase {
  pub fn can_advance_to(self, next: Self) -> bool {
    use ImportPhase::*;
    matches!(
      (self, next),
      (Idle, Authenticating | Authenticated | Failed)
        | (Authenticating, Authenticated | Failed)
        | (Authenticated, Paging | Completed | Failed)
        | (Paging, Paging | Completed | Failed)
    )
  }
}

/// Phase tracking for one connect or import call.
struct Operation<'a> {
  provider_id: &'a str,
  user_id:     Uuid,
  phase:       ImportPhase,
}

impl<'a> Operation<'a> {
  fn start(provider_id: &'a str, user_id: Uuid) -> Self {
    Self { provider_id, user_id, phase: ImportPhase::Idle }
  }

  fn advance(&mut self, next: ImportPhase) {
    debug_assert!(self.phase.can_advance_to(next), "{:?} -> {next:?}", self.phase);
    tracing::trace!(
      provider = self.provider_id,
      user_id = %self.user_id,
      from = ?self.phase,
      to = ?next,
      "import phase"
    );
    self.phase = next;
  }

  /// Mark the operation failed and pass the error through.
  fn fail(&mut self, e: Error) -> Error {
    self.advance(ImportPhase::Failed);
    e
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectOutcome {
  /// Send the user here; call `connect` again with the returned code.
  Redirect { authorize_url: String },
  Connected {
    provider_id: String,
    expires_at:  Option<DateTime<Utc>>,
  },
}

impl ConnectOutcome {
  pub fn phase(&self) -> ImportPhase {
    match self {
      Self::Redirect { .. } => ImportPhase::Authenticating,
      Self::Connected { .. } => ImportPhase::Authenticated,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
  pub friends: Vec<Friend>,
  pub pages:   u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteReceipt {
  pub success:   bool,
  pub token:     String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deep_link: Option<String>,
}

/// What happened to one friend of a batch.
#[derive(Debug)]
pub struct BatchEntry {
  pub external_id: String,
  pub outcome:     Result<InviteReceipt>,
}

/// Result of [`SocialImporter::send_invites`].
#[derive(Debug, Default)]
pub struct InviteBatch {
  /// One entry per friend attempted, in input order.
  pub entries:   Vec<BatchEntry>,
  /// Set when the anti-spam gate stopped the batch.
  pub blocked:   Option<BlockReason>,
  pub cancelled: bool,
  /// Friends never attempted.
  pub remaining: usize,
}

impl InviteBatch {
  pub fn sent(&self) -> usize { self.entries.iter().filter(|e| e.outcome.is_ok()).count() }
}

// ─── Importer ────────────────────────────────────────────────────────────────

pub struct SocialImporter<S, C> {
  registry:  Arc<ProviderRegistry>,
  consent:   ConsentGate<S>,
  vault:     SecureTokenStore<S>,
  antispam:  AntiSpamGate<S>,
  metrics:   Arc<S>,
  limiter:   RateLimiter,
  connector: C,
  settings:  ImportSettings,
}

impl<S, C> SocialImporter<S, C>
where
  S: ConsentStore + TokenStore + MetricsStore,
  C: Connector,
{
  pub fn new(
    registry: Arc<ProviderRegistry>,
    store: Arc<S>,
    vault: SecureTokenStore<S>,
    connector: C,
    settings: ImportSettings,
  ) -> Self {
    Self {
      registry,
      consent: ConsentGate::new(Arc::clone(&store)),
      antispam: AntiSpamGate::new(Arc::clone(&store), settings.antispam),
      metrics: store,
      vault,
      limiter: RateLimiter::new(settings.rate_limit_max_wait),
      connector,
      settings,
    }
  }

  pub fn registry(&self) -> &ProviderRegistry { &self.registry }

  pub fn consent(&self) -> &ConsentGate<S> { &self.consent }

  pub fn antispam(&self) -> &AntiSpamGate<S> { &self.antispam }

  pub fn vault(&self) -> &SecureTokenStore<S> { &self.vault }

  // ── Connect ───────────────────────────────────────────────────────────

  /// Authenticate `user_id` with the provider and store the resulting
  /// token.
  ///
  /// Redirect-based providers take two calls: without `code` this returns
  /// [`ConnectOutcome::Redirect`]; the provider then sends the user back
  /// with a code and the `state` it was given, which complete the second
  /// call.
  pub async fn connect(
    &self,
    provider_id: &str,
    user_id: Uuid,
    code: Option<&str>,
    state: Option<&str>,
  ) -> Result<ConnectOutcome> {
    self.consent.require(user_id, provider_id).await?;
    let provider = self.registry.get(provider_id)?;

    let mut op = Operation::start(&provider.id, user_id);
    op.advance(ImportPhase::Authenticating);

    let redirect = provider.method.uses_authorization_redirect();
    let issued_state;
    let state = match (redirect, code) {
      (true, None) => {
        issued_state = self.vault.issue_state(user_id, provider_id)?;
        issued_state.as_str()
      }
      (true, Some(_)) => {
        let state = state.unwrap_or_default();
        if !self.vault.verify_state(state, user_id, provider_id) {
          return Err(op.fail(auth_failed(provider, "authorization state is missing or expired")));
        }
        state
      }
      (false, _) => "",
    };

    // Building the redirect needs no provider call.
    if !(redirect && code.is_none()) {
      self.limiter.acquire(provider).await.map_err(|e| op.fail(e))?;
    }

    let request = AuthRequest {
      user_id,
      state,
      code,
      redirect_uri: &self.settings.redirect_uri,
    };
    let outcome =
      tokio::time::timeout(self.settings.call_timeout, self.connector.authenticate(provider, request))
        .await
        .unwrap_or(Err(ConnectorError::Timeout))
        .map_err(|e| op.fail(auth_failed(provider, &e.to_string())))?;

    match outcome {
      AuthOutcome::Redirect { authorize_url } => {
        tracing::info!(provider = %provider.id, %user_id, "authorization redirect issued");
        Ok(ConnectOutcome::Redirect { authorize_url })
      }
      AuthOutcome::Token(token) => {
        // Consent may have been revoked while the provider was answering.
        self.consent.require(user_id, provider_id).await.map_err(|e| op.fail(e))?;
        self
          .vault
          .store(user_id, provider_id, &token)
          .await
          .map_err(|e| op.fail(e))?;
        op.advance(ImportPhase::Authenticated);
        tracing::info!(provider = %provider.id, %user_id, "provider connected");
        Ok(ConnectOutcome::Connected {
          provider_id: provider.id.clone(),
          expires_at:  token.expires_at(),
        })
      }
    }
  }

  // ── Import ────────────────────────────────────────────────────────────

  /// Page through the user's contacts on the provider, anonymising as it
  /// goes, until the provider runs out of pages or `limit` friends are
  /// collected. Any failure discards everything collected so far.
  pub async fn import_friends(
    &self,
    provider_id: &str,
    user_id: Uuid,
    limit: usize,
    cancel: &CancelSignal,
  ) -> Result<ImportReport> {
    self.consent.require(user_id, provider_id).await?;
    let provider = self.registry.get(provider_id)?;
    let token = self.vault.get(user_id, provider_id).await?;

    let mut op = Operation::start(&provider.id, user_id);
    op.advance(ImportPhase::Authenticated);

    let mut friends: Vec<Friend> = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0u32;

    while friends.len() < limit {
      op.advance(ImportPhase::Paging);
      let remaining = u32::try_from(limit - friends.len()).unwrap_or(u32::MAX);
      let page_size = provider.page_size.max(1).min(remaining);

      let page = self
        .fetch_with_retry(provider, &token, cursor.as_deref(), page_size, cancel)
        .await
        .map_err(|e| op.fail(e))?;
      pages += 1;

      let received = page.contacts.len();
      let fresh = page
        .contacts
        .into_iter()
        .filter_map(|raw| anonymize(raw, provider, user_id))
        .filter(|friend| seen.insert(friend.external_id.clone()));
      friends.extend(fresh);
      tracing::debug!(provider = %provider.id, page = pages, received, total = friends.len(), "page imported");

      let next = match page.next_cursor {
        Some(next) if cursor.as_deref() == Some(next.as_str()) => {
          tracing::warn!(provider = %provider.id, "provider repeated its cursor; stopping");
          None
        }
        next => next,
      };
      cursor = next;
      if cursor.is_none() || friends.len() >= limit {
        break;
      }

      cancel
        .guard(tokio::time::sleep(self.settings.page_delay))
        .await
        .map_err(|e| op.fail(e))?;
    }

    friends.truncate(limit);
    op.advance(ImportPhase::Completed);
    tracing::info!(provider = %provider.id, %user_id, friends = friends.len(), pages, "import completed");
    Ok(ImportReport { friends, pages })
  }

  async fn fetch_with_retry(
    &self,
    provider: &Provider,
    token: &vault::ProviderToken,
    cursor: Option<&str>,
    page_size: u32,
    cancel: &CancelSignal,
  ) -> Result<RawPage> {
    let max_attempts = self.settings.max_attempts.max(1);
    let mut attempt = 0;

    loop {
      attempt += 1;
      cancel.guard(self.limiter.acquire(provider)).await??;

      let call = tokio::time::timeout(
        self.settings.call_timeout,
        self.connector.fetch_page(provider, token, cursor, page_size),
      );
      let error = match cancel.guard(call).await? {
        Ok(Ok(page)) => return Ok(page),
        Ok(Err(e)) => e,
        Err(_) => ConnectorError::Timeout,
      };

      if !error.is_transient() || attempt >= max_attempts {
        return Err(Error::ImportFailed {
          provider_id: provider.id.clone(),
          attempts:    attempt,
          reason:      error.to_string(),
        });
      }

      let mut backoff = self.settings.backoff_base.saturating_mul(1 << (attempt - 1).min(16));
      if let ConnectorError::Throttled { retry_after: Some(hint) } = error {
        backoff = backoff.max(hint);
      }
      tracing::warn!(provider = %provider.id, attempt, ?backoff, %error, "page fetch failed; retrying");
      cancel.guard(tokio::time::sleep(backoff)).await?;
    }
  }

  // ── Invite ────────────────────────────────────────────────────────────

  /// Send `template` to `friend`, with `{token}` and `{name}` substituted.
  /// Delivery is attempted once.
  pub async fn send_invite(&self, friend: &Friend, template: &str) -> Result<InviteReceipt> {
    let provider = self.registry.get(&friend.provider)?;
    let owner = friend.owner_id;

    self.consent.require(owner, &provider.id).await?;
    self.antispam.authorize(owner).await?;

    let token = self.vault.issue_invite_token(
      owner,
      &provider.id,
      &friend.external_id,
      self.settings.invite_ttl,
    )?;
    let message = render_template(template, &token, &friend.display_name);

    let route = DispatchRoute::for_invite(provider, friend);
    let session = match route {
      DispatchRoute::DeepLink => None,
      _ => Some(self.vault.get(owner, &provider.id).await?),
    };

    self.limiter.acquire(provider).await?;
    let invitation = Invitation { friend, message: &message, route };
    let delivery = tokio::time::timeout(
      self.settings.call_timeout,
      self.connector.deliver(provider, session.as_ref(), invitation),
    )
    .await
    .unwrap_or(Err(ConnectorError::Timeout))
    .map_err(|e| Error::InviteDeliveryFailed {
      provider_id: provider.id.clone(),
      reason:      e.to_string(),
    })?;

    let record = InviteRecord {
      invite_id:   Uuid::new_v4(),
      user_id:     owner,
      provider_id: provider.id.clone(),
      external_id: friend.external_id.clone(),
      sent_at:     Utc::now(),
    };
    if let Err(e) = self.metrics.record_invite(record).await {
      tracing::warn!(provider = %provider.id, user_id = %owner, error = %e, "invite sent but not recorded");
    }

    tracing::info!(
      provider = %provider.id,
      user_id = %owner,
      ?route,
      token = %vault::fingerprint(&token),
      "invite sent"
    );
    Ok(InviteReceipt { success: true, token, deep_link: delivery.deep_link })
  }

  /// Invite `friends` one after the other, pausing
  /// [`invite_delay`](ImportSettings::invite_delay) between sends.
  ///
  /// The anti-spam gate is consulted afresh for every friend; the first
  /// refusal stops the batch. Other failures are recorded and the batch
  /// moves on. Cancellation is honoured between sends, never during one.
  pub async fn send_invites(
    &self,
    friends: &[Friend],
    template: Option<&str>,
    cancel: &CancelSignal,
  ) -> InviteBatch {
    let template = template.unwrap_or(DEFAULT_INVITE_TEMPLATE);
    let mut batch = InviteBatch::default();

    for (i, friend) in friends.iter().enumerate() {
      let pause = if i == 0 { Duration::ZERO } else { self.settings.invite_delay };
      if cancel.guard(tokio::time::sleep(pause)).await.is_err() {
        batch.cancelled = true;
        batch.remaining = friends.len() - i;
        break;
      }

      let outcome = self.send_invite(friend, template).await;
      if let Err(e) = &outcome {
        tracing::debug!(provider = %friend.provider, error = %e, "batch invite failed");
      }
      let blocked = match &outcome {
        Err(Error::InviteBlocked(reason)) => Some(*reason),
        _ => None,
      };
      batch.entries.push(BatchEntry { external_id: friend.external_id.clone(), outcome });

      if blocked.is_some() {
        batch.blocked = blocked;
        batch.remaining = friends.len() - i - 1;
        break;
      }
    }

    tracing::info!(
      attempted = batch.entries.len(),
      sent = batch.sent(),
      remaining = batch.remaining,
      blocked = ?batch.blocked,
      cancelled = batch.cancelled,
      "invite batch finished"
    );
    batch
  }

  // ── Teardown ──────────────────────────────────────────────────────────

  /// Forget the stored token; returns whether there was one.
  pub async fn disconnect(&self, provider_id: &str, user_id: Uuid) -> Result<bool> {
    let provider = self.registry.get(provider_id)?;
    let removed = self.vault.delete(user_id, &provider.id).await?;
    tracing::info!(provider = %provider.id, %user_id, removed, "provider disconnected");
    Ok(removed)
  }

  /// Revoke consent and drop the stored token with it. Returns whether the
  /// user had ever decided on this provider.
  pub async fn revoke_consent(&self, provider_id: &str, user_id: Uuid) -> Result<bool> {
    let revoked = self.consent.revoke(user_id, provider_id).await?;
    self.vault.delete(user_id, provider_id).await?;
    Ok(revoked.is_some())
  }
}

fn auth_failed(provider: &Provider, reason: &str) -> Error {
  Error::AuthFlowFailed { provider_id: provider.id.clone(), reason: reason.to_owned() }
}

/// Substitute `{token}` and `{name}` in an invitation template.
pub fn render_template(template: &str, token: &str, name: &str) -> String {
  template.replace("{token}", token).replace("{name}", name)
}
