//! Error type for `helpnet-match`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] helpnet_core::Error),

  #[error("invalid help request: {0}")]
  InvalidRequest(String),

  #[error("help request {0} was changed concurrently; reload and retry")]
  Conflict(Uuid),

  #[error("classifier error: {0}")]
  Classifier(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  /// Stable, machine-readable name of the error kind.
  pub fn kind(&self) -> &'static str {
    use helpnet_core::Error as Core;
    match self {
      Self::Core(Core::InvalidTransition { .. }) => "invalid_transition",
      Self::Core(Core::RequestNotFound(_)) => "not_found",
      Self::Core(Core::Serialization(_)) => "internal",
      Self::Core(_) | Self::InvalidRequest(_) => "invalid_input",
      Self::Conflict(_) => "conflict",
      Self::Classifier(_) => "classifier",
      Self::Store(_) => "store",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
