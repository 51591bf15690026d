//! Persistence and geospatial collaborator traits.
//!
//! The traits are implemented by storage backends (e.g.
//! `helpnet-store-sqlite`). The import pipeline and the matching engine depend
//! on these abstractions, not on any concrete backend. Every method is atomic
//! per record.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  consent::ConsentRecord,
  friend::InviteRecord,
  geo::GeoPoint,
  help::{HelpCategory, HelpRequest, HelpStatus},
  matching::{HelperCandidate, HelperProfile},
  metrics::UserMetrics,
  token::TokenRecord,
};

// ─── Consent ─────────────────────────────────────────────────────────────────

pub trait ConsentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The record for `(user_id, provider_id)`, if the user ever decided.
  fn get_consent<'a>(
    &'a self,
    user_id: Uuid,
    provider_id: &'a str,
  ) -> impl Future<Output = Result<Option<ConsentRecord>, Self::Error>> + Send + 'a;

  /// Create or replace the record for the pair.
  fn put_consent(
    &self,
    record: ConsentRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

pub trait TokenStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get_token<'a>(
    &'a self,
    user_id: Uuid,
    provider_id: &'a str,
  ) -> impl Future<Output = Result<Option<TokenRecord>, Self::Error>> + Send + 'a;

  /// Create or replace the token for the record's pair.
  fn put_token(
    &self,
    record: TokenRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove the token; returns whether one existed.
  fn delete_token<'a>(
    &'a self,
    user_id: Uuid,
    provider_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── Metrics and invite log ──────────────────────────────────────────────────

pub trait MetricsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get_metrics(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<UserMetrics>, Self::Error>> + Send + '_;

  /// Append an invitation to the user's send log.
  fn record_invite(
    &self,
    record: InviteRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Invitations sent by `user_id` at or after `since`.
  fn count_invites_since(
    &self,
    user_id: Uuid,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;
}

// ─── Help requests ───────────────────────────────────────────────────────────

pub trait HelpRequestStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn insert_request(
    &self,
    request: HelpRequest,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_request(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<HelpRequest>, Self::Error>> + Send + '_;

  /// Compare-and-set the status. Returns `false` (and changes nothing) when
  /// the stored status is no longer `from`.
  fn update_status(
    &self,
    id: Uuid,
    from: HelpStatus,
    to: HelpStatus,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

// ─── Geospatial ──────────────────────────────────────────────────────────────

pub trait GeoIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create or replace a helper's profile.
  fn upsert_helper(
    &self,
    profile: HelperProfile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Up to `limit` helpers within `max_distance_km` of `point`, ordered by
  /// ascending distance.
  ///
  /// `category` describes the need being served. Implementations may use it
  /// to narrow the search but must not drop helpers for lacking the skill:
  /// skill fit is part of the score, not a filter.
  fn find_nearby(
    &self,
    point: GeoPoint,
    max_distance_km: f64,
    category: HelpCategory,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<HelperCandidate>, Self::Error>> + Send + '_;

  /// Open requests with urgency at least `min_urgency` within `radius_km`.
  fn count_open_urgent(
    &self,
    point: GeoPoint,
    radius_km: f64,
    min_urgency: u8,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;
}
