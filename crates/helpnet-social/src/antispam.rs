//! Invite gating from a user's historical metrics.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use helpnet_core::{
  metrics::{AntiSpamPolicy, BlockReason, InviteAllowance},
  store::MetricsStore,
};
use uuid::Uuid;

use crate::{Error, Result};

pub struct AntiSpamGate<M> {
  store:  Arc<M>,
  policy: AntiSpamPolicy,
}

impl<M> Clone for AntiSpamGate<M> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), policy: self.policy } }
}

impl<M: MetricsStore> AntiSpamGate<M> {
  pub fn new(store: Arc<M>, policy: AntiSpamPolicy) -> Self { Self { store, policy } }

  pub fn policy(&self) -> &AntiSpamPolicy { &self.policy }

  /// Evaluate the user's current metrics. Users without metrics get the
  /// zero defaults, which are not allowed to invite.
  pub async fn can_invite(&self, user_id: Uuid) -> Result<InviteAllowance> {
    let metrics = self
      .store
      .get_metrics(user_id)
      .await
      .map_err(Error::store)?
      .unwrap_or_default();
    Ok(self.policy.evaluate(&metrics))
  }

  /// [`can_invite`](Self::can_invite) plus today's quota. Any refusal comes
  /// back as [`Error::InviteBlocked`].
  pub async fn authorize(&self, user_id: Uuid) -> Result<InviteAllowance> {
    let allowance = self.can_invite(user_id).await?;
    if let Some(reason) = allowance.reason {
      return Err(Error::InviteBlocked(reason));
    }

    let sent = self
      .store
      .count_invites_since(user_id, start_of_day(Utc::now()))
      .await
      .map_err(Error::store)?;
    if sent >= allowance.daily_limit {
      tracing::debug!(%user_id, sent, limit = allowance.daily_limit, "daily invite quota used up");
      return Err(Error::InviteBlocked(BlockReason::DailyLimitReached));
    }
    Ok(allowance)
  }
}

/// Quotas reset at midnight UTC.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
  now.date_naive().and_time(NaiveTime::MIN).and_utc()
}
