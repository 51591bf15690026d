//! Collaborators outside the persistence layer: helper notification and
//! request classification.
//!
//! Both are opaque to the core. Notification is fire-and-forget; the
//! classifier is a black box returning a category guess with a confidence.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  geo::GeoPoint,
  help::{HelpCategory, Urgency},
};

/// Output of a [`Classifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
  pub category:   HelpCategory,
  pub urgency:    Urgency,
  /// In `[0, 1]`.
  pub confidence: f64,
}

/// Infers what kind of help a free-text request describes.
pub trait Classifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn classify<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Classification, Self::Error>> + Send + 'a;
}

/// Alerts helpers around a point that someone needs them.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn notify_nearby(
    &self,
    point: GeoPoint,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
