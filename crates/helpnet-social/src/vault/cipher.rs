//! AES-256-GCM sealing of provider tokens.

use aes_gcm::{
  Aes256Gcm, Nonce,
  aead::{Aead, KeyInit, Payload},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use rand_core::{OsRng, RngCore};

use crate::{Error, Result};

const NONCE_LEN: usize = 12;

/// Seals and opens token strings. The associated data binds a ciphertext to
/// the (user, provider) pair it was stored under, so a row copied to another
/// pair fails to open.
pub(crate) struct TokenCipher {
  aead: Aes256Gcm,
}

impl TokenCipher {
  pub(crate) fn new(key: &[u8]) -> Result<Self> {
    let aead = Aes256Gcm::new_from_slice(key)
      .map_err(|e| Error::Crypto(format!("cipher key: {e}")))?;
    Ok(Self { aead })
  }

  /// `base64(nonce ‖ ciphertext)`.
  pub(crate) fn seal(&self, plaintext: &str, aad: &[u8]) -> Result<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = self
      .aead
      .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext.as_bytes(), aad })
      .map_err(|_| Error::Crypto("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(B64.encode(out))
  }

  pub(crate) fn open(&self, encoded: &str, aad: &[u8]) -> Result<String> {
    let raw = B64
      .decode(encoded)
      .map_err(|e| Error::Crypto(format!("ciphertext encoding: {e}")))?;
    if raw.len() <= NONCE_LEN {
      return Err(Error::Crypto("ciphertext truncated".into()));
    }
    let (nonce, sealed) = raw.split_at(NONCE_LEN);

    let plain = self
      .aead
      .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
      .map_err(|_| Error::Crypto("ciphertext rejected".into()))?;
    String::from_utf8(plain).map_err(|e| Error::Crypto(format!("plaintext: {e}")))
  }
}
