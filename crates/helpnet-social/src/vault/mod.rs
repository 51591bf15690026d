//! The secure token store.
//!
//! Provider tokens are encrypted before they reach the [`TokenStore`] and
//! decrypted only on the way to a connector. The same key material signs
//! invitation tokens and the `state` parameter of redirect-based connects.

mod cipher;
mod signer;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use helpnet_core::{store::TokenStore, token::TokenRecord};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use self::{cipher::TokenCipher, signer::ClaimSigner};
use crate::{Error, Result};

/// Validity of an invitation token, in days, when none is configured.
pub const DEFAULT_INVITE_TTL_DAYS: i64 = 7;

/// Validity of an authorization `state` parameter.
const STATE_TTL_SECS: i64 = 600;

const INVITE_PURPOSE: &str = "invite";
const STATE_PURPOSE: &str = "oauth-state";

// ─── Plaintext token ─────────────────────────────────────────────────────────

/// A decrypted provider credential. Its `Debug` output never shows the
/// secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderToken {
  access:     String,
  refresh:    Option<String>,
  expires_at: Option<DateTime<Utc>>,
}

impl ProviderToken {
  pub fn new(access: impl Into<String>) -> Self {
    Self { access: access.into(), refresh: None, expires_at: None }
  }

  pub fn with_refresh(mut self, refresh: impl Into<String>) -> Self {
    self.refresh = Some(refresh.into());
    self
  }

  pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
    self.expires_at = Some(at);
    self
  }

  pub fn access_token(&self) -> &str { &self.access }

  pub fn refresh_token(&self) -> Option<&str> { self.refresh.as_deref() }

  pub fn expires_at(&self) -> Option<DateTime<Utc>> { self.expires_at }
}

impl std::fmt::Debug for ProviderToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProviderToken")
      .field("access", &"<redacted>")
      .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
      .field("expires_at", &self.expires_at)
      .finish()
  }
}

// ─── Signed claims ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct InviteClaims {
  /// Friend external id.
  fid: String,
  /// Inviting user.
  uid: Uuid,
  /// Provider the invite went through.
  pid: String,
  exp: i64,
  jti: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
  uid:   Uuid,
  pid:   String,
  exp:   i64,
  nonce: String,
}

/// Result of checking an invitation token. A token with a good signature but
/// past its expiry still reports who it was for, with `valid = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteVerification {
  pub valid:       bool,
  pub friend_id:   Option<String>,
  pub inviter_id:  Option<Uuid>,
  pub provider_id: Option<String>,
}

impl InviteVerification {
  fn rejected() -> Self {
    Self { valid: false, friend_id: None, inviter_id: None, provider_id: None }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

pub struct SecureTokenStore<S> {
  store:  Arc<S>,
  cipher: TokenCipher,
  signer: ClaimSigner,
}

impl<S: TokenStore> SecureTokenStore<S> {
  /// Derive the encryption and signing keys from `secret` with Argon2id.
  /// `salt` must be at least 8 bytes.
  pub fn new(store: Arc<S>, secret: &str, salt: &[u8]) -> Result<Self> {
    let mut okm = [0u8; 64];
    argon2::Argon2::default()
      .hash_password_into(secret.as_bytes(), salt, &mut okm)
      .map_err(|e| Error::Crypto(format!("key derivation: {e}")))?;
    let (enc_key, mac_key) = okm.split_at(32);

    Ok(Self {
      store,
      cipher: TokenCipher::new(enc_key)?,
      signer: ClaimSigner::new(mac_key),
    })
  }

  /// Encrypt and persist `token`, replacing any earlier one for the pair.
  pub async fn store(&self, user_id: Uuid, provider_id: &str, token: &ProviderToken) -> Result<()> {
    let aad = associated_data(user_id, provider_id);
    let record = TokenRecord {
      user_id,
      provider_id: provider_id.to_owned(),
      access_token_enc: self.cipher.seal(&token.access, &aad)?,
      refresh_token_enc: token
        .refresh
        .as_deref()
        .map(|r| self.cipher.seal(r, &aad))
        .transpose()?,
      expires_at: token.expires_at,
      stored_at: Utc::now(),
    };
    self.store.put_token(record).await.map_err(Error::store)?;
    tracing::debug!(%user_id, provider = provider_id, "provider token stored");
    Ok(())
  }

  /// The decrypted token. Expired tokens are reported, never refreshed.
  pub async fn get(&self, user_id: Uuid, provider_id: &str) -> Result<ProviderToken> {
    let record = self
      .store
      .get_token(user_id, provider_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::TokenNotFound { user_id, provider_id: provider_id.to_owned() })?;

    if record.is_expired(Utc::now()) {
      return Err(Error::TokenExpired { user_id, provider_id: provider_id.to_owned() });
    }

    let aad = associated_data(user_id, provider_id);
    Ok(ProviderToken {
      access:     self.cipher.open(&record.access_token_enc, &aad)?,
      refresh:    record
        .refresh_token_enc
        .as_deref()
        .map(|r| self.cipher.open(r, &aad))
        .transpose()?,
      expires_at: record.expires_at,
    })
  }

  /// Remove the stored token; returns whether one existed.
  pub async fn delete(&self, user_id: Uuid, provider_id: &str) -> Result<bool> {
    self
      .store
      .delete_token(user_id, provider_id)
      .await
      .map_err(Error::store)
  }

  /// Mint a signed invitation token for `friend_id`, valid for `ttl`.
  pub fn issue_invite_token(
    &self,
    inviter_id: Uuid,
    provider_id: &str,
    friend_id: &str,
    ttl: Duration,
  ) -> Result<String> {
    let claims = InviteClaims {
      fid: friend_id.to_owned(),
      uid: inviter_id,
      pid: provider_id.to_owned(),
      exp: (Utc::now() + ttl).timestamp(),
      jti: Uuid::new_v4(),
    };
    self.signer.sign(INVITE_PURPOSE, &claims)
  }

  /// Signature and expiry only; redemption is not tracked.
  pub fn verify_invite_token(&self, token: &str) -> InviteVerification {
    let Some(claims) = self.signer.verify::<InviteClaims>(INVITE_PURPOSE, token) else {
      return InviteVerification::rejected();
    };
    InviteVerification {
      valid:       claims.exp > Utc::now().timestamp(),
      friend_id:   Some(claims.fid),
      inviter_id:  Some(claims.uid),
      provider_id: Some(claims.pid),
    }
  }

  /// An opaque `state` value for an authorization redirect, bound to the
  /// user and provider.
  pub fn issue_state(&self, user_id: Uuid, provider_id: &str) -> Result<String> {
    let mut nonce = [0u8; 16];
    OsRng.fill_bytes(&mut nonce);
    let claims = StateClaims {
      uid:   user_id,
      pid:   provider_id.to_owned(),
      exp:   (Utc::now() + Duration::seconds(STATE_TTL_SECS)).timestamp(),
      nonce: hex::encode(nonce),
    };
    self.signer.sign(STATE_PURPOSE, &claims)
  }

  /// The user and provider an unexpired `state` was issued for. Lets a
  /// redirect callback that carries only `code` and `state` find its way
  /// back to the pending connect.
  pub fn state_owner(&self, state: &str) -> Option<(Uuid, String)> {
    self
      .signer
      .verify::<StateClaims>(STATE_PURPOSE, state)
      .filter(|c| c.exp > Utc::now().timestamp())
      .map(|c| (c.uid, c.pid))
  }

  pub fn verify_state(&self, state: &str, user_id: Uuid, provider_id: &str) -> bool {
    self
      .signer
      .verify::<StateClaims>(STATE_PURPOSE, state)
      .is_some_and(|c| {
        c.uid == user_id && c.pid == provider_id && c.exp > Utc::now().timestamp()
      })
  }
}

fn associated_data(user_id: Uuid, provider_id: &str) -> Vec<u8> {
  format!("{user_id}:{provider_id}").into_bytes()
}

/// Short, non-reversible label for a token, safe to put in logs.
pub fn fingerprint(token: &str) -> String {
  let digest = Sha256::digest(token.as_bytes());
  hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
  use helpnet_store_sqlite::SqliteStore;

  use super::*;

  async fn vault() -> (SecureTokenStore<SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let vault = SecureTokenStore::new(Arc::clone(&store), "test-secret", b"helpnet-test-salt").unwrap();
    (vault, store)
  }

  #[tokio::test]
  async fn tokens_are_encrypted_at_rest() {
    let (vault, store) = vault().await;
    let user = Uuid::new_v4();
    let token = ProviderToken::new("EAAB-access").with_refresh("refresh-me");
    vault.store(user, "facebook", &token).await.unwrap();

    let raw = store.get_token(user, "facebook").await.unwrap().unwrap();
    assert!(!raw.access_token_enc.contains("EAAB-access"));
    assert!(!raw.refresh_token_enc.unwrap().contains("refresh-me"));

    let back = vault.get(user, "facebook").await.unwrap();
    assert_eq!(back, token);
  }

  #[tokio::test]
  async fn missing_and_expired_tokens() {
    let (vault, _) = vault().await;
    let user = Uuid::new_v4();
    assert!(matches!(vault.get(user, "facebook").await, Err(Error::TokenNotFound { .. })));

    let stale = ProviderToken::new("old").expiring_at(Utc::now() - Duration::minutes(1));
    vault.store(user, "facebook", &stale).await.unwrap();
    assert!(matches!(vault.get(user, "facebook").await, Err(Error::TokenExpired { .. })));

    assert!(vault.delete(user, "facebook").await.unwrap());
    assert!(matches!(vault.get(user, "facebook").await, Err(Error::TokenNotFound { .. })));
  }

  #[tokio::test]
  async fn ciphertext_is_bound_to_its_pair() {
    let (vault, store) = vault().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    vault.store(alice, "facebook", &ProviderToken::new("alice-token")).await.unwrap();

    let mut stolen = store.get_token(alice, "facebook").await.unwrap().unwrap();
    stolen.user_id = bob;
    store.put_token(stolen).await.unwrap();
    assert!(matches!(vault.get(bob, "facebook").await, Err(Error::Crypto(_))));
  }

  #[tokio::test]
  async fn invite_tokens_check_signature_and_expiry() {
    let (vault, _) = vault().await;
    let inviter = Uuid::new_v4();

    let token = vault.issue_invite_token(inviter, "telegram", "tg-42", Duration::days(DEFAULT_INVITE_TTL_DAYS)).unwrap();
    let v = vault.verify_invite_token(&token);
    assert!(v.valid);
    assert_eq!(v.friend_id.as_deref(), Some("tg-42"));
    assert_eq!(v.inviter_id, Some(inviter));

    // Verification does not consume the token.
    assert!(vault.verify_invite_token(&token).valid);

    let expired = vault.issue_invite_token(inviter, "telegram", "tg-42", Duration::seconds(-5)).unwrap();
    let v = vault.verify_invite_token(&expired);
    assert!(!v.valid);
    assert_eq!(v.friend_id.as_deref(), Some("tg-42"));

    assert_eq!(vault.verify_invite_token("junk"), InviteVerification::rejected());
  }

  #[tokio::test]
  async fn state_is_bound_to_user_and_provider() {
    let (vault, _) = vault().await;
    let user = Uuid::new_v4();
    let state = vault.issue_state(user, "facebook").unwrap();
    assert!(vault.verify_state(&state, user, "facebook"));
    assert!(!vault.verify_state(&state, user, "linkedin"));
    assert!(!vault.verify_state(&state, Uuid::new_v4(), "facebook"));
    assert_eq!(vault.state_owner(&state), Some((user, "facebook".to_owned())));
    assert_eq!(vault.state_owner("forged"), None);

    // A state is not an invite and vice versa.
    assert!(!vault.verify_invite_token(&state).valid);
  }

  #[tokio::test]
  async fn short_salt_is_rejected() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    assert!(matches!(SecureTokenStore::new(store, "s", b"abc"), Err(Error::Crypto(_))));
  }

  #[test]
  fn fingerprint_is_short_and_stable() {
    assert_eq!(fingerprint("abc"), fingerprint("abc"));
    assert_eq!(fingerprint("abc").len(), 12);
    assert_ne!(fingerprint("abc"), fingerprint("abd"));
  }
}
