//! Error types for `helpnet-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::help::HelpStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("urgency must be between 1 and 10, got {0}")]
  InvalidUrgency(i64),

  #[error("invalid coordinates: lat {lat}, lon {lon}")]
  InvalidCoordinates { lat: f64, lon: f64 },

  #[error("unknown help category: {0:?}")]
  UnknownCategory(String),

  #[error("help request {id} cannot move from {from} to {to}")]
  InvalidTransition {
    id:   Uuid,
    from: HelpStatus,
    to:   HelpStatus,
  },

  #[error("help request not found: {0}")]
  RequestNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
