//! The consent gate: no import, connection or invitation happens for a
//! (user, provider) pair the user has not explicitly approved.

use std::sync::Arc;

use chrono::Utc;
use helpnet_core::{consent::ConsentRecord, store::ConsentStore};
use uuid::Uuid;

use crate::{Error, Result};

pub struct ConsentGate<S> {
  store: Arc<S>,
}

impl<S> Clone for ConsentGate<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: ConsentStore> ConsentGate<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Whether the user currently grants the provider. Always read through to
  /// the store; consent can be revoked between two calls.
  pub async fn check_consent(&self, user_id: Uuid, provider_id: &str) -> Result<bool> {
    let record = self
      .store
      .get_consent(user_id, provider_id)
      .await
      .map_err(Error::store)?;
    Ok(record.is_some_and(|r| r.granted))
  }

  /// `Ok(())` if granted, [`Error::ConsentRequired`] otherwise.
  pub async fn require(&self, user_id: Uuid, provider_id: &str) -> Result<()> {
    if self.check_consent(user_id, provider_id).await? {
      Ok(())
    } else {
      Err(Error::ConsentRequired { user_id, provider_id: provider_id.to_owned() })
    }
  }

  /// Record an explicit approval. Re-granting refreshes `granted_at`.
  pub async fn grant(&self, user_id: Uuid, provider_id: &str) -> Result<ConsentRecord> {
    let record = ConsentRecord::granted(user_id, provider_id, Utc::now());
    self
      .store
      .put_consent(record.clone())
      .await
      .map_err(Error::store)?;
    tracing::info!(%user_id, provider = provider_id, "consent granted");
    Ok(record)
  }

  /// Withdraw approval. Returns `None` when the user never decided, in which
  /// case nothing is written.
  pub async fn revoke(&self, user_id: Uuid, provider_id: &str) -> Result<Option<ConsentRecord>> {
    let Some(mut record) = self
      .store
      .get_consent(user_id, provider_id)
      .await
      .map_err(Error::store)?
    else {
      return Ok(None);
    };

    record.revoke(Utc::now());
    self
      .store
      .put_consent(record.clone())
      .await
      .map_err(Error::store)?;
    tracing::info!(%user_id, provider = provider_id, "consent revoked");
    Ok(Some(record))
  }
}
