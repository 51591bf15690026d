//! HMAC-SHA256 signed, base64url-encoded claims.
//!
//! Wire form: `base64url(payload) "." base64url(mac)`. The MAC covers a
//! purpose label as well as the payload, so a token minted for one purpose
//! never verifies for another.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub(crate) struct ClaimSigner {
  key: Vec<u8>,
}

impl ClaimSigner {
  pub(crate) fn new(key: &[u8]) -> Self { Self { key: key.to_vec() } }

  fn mac(&self, purpose: &str, payload: &str) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
      .map_err(|e| Error::Crypto(format!("signing key: {e}")))?;
    mac.update(purpose.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac)
  }

  pub(crate) fn sign<T: Serialize>(&self, purpose: &str, claims: &T) -> Result<String> {
    let json = serde_json::to_vec(claims).map_err(|e| Error::Crypto(e.to_string()))?;
    let payload = B64URL.encode(json);
    let tag = self.mac(purpose, &payload)?.finalize().into_bytes();
    Ok(format!("{payload}.{}", B64URL.encode(tag)))
  }

  /// The claims if the token is well-formed and its MAC checks out for
  /// `purpose`; `None` otherwise. Expiry is the caller's concern.
  pub(crate) fn verify<T: DeserializeOwned>(&self, purpose: &str, token: &str) -> Option<T> {
    let (payload, tag) = token.split_once('.')?;
    let tag = B64URL.decode(tag).ok()?;
    self.mac(purpose, payload).ok()?.verify_slice(&tag).ok()?;
    let json = B64URL.decode(payload).ok()?;
    serde_json::from_slice(&json).ok()
  }
}
