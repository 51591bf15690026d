//! [`SqliteStore`]: the SQLite implementation of the HelpNet collaborator
//! traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use helpnet_core::{
  consent::ConsentRecord,
  friend::InviteRecord,
  geo::GeoPoint,
  help::{HelpCategory, HelpRequest, HelpStatus},
  matching::{HelperCandidate, HelperProfile},
  metrics::UserMetrics,
  store::{ConsentStore, GeoIndex, HelpRequestStore, MetricsStore, TokenStore},
  token::TokenRecord,
};

use crate::{
  Result,
  encode::{
    RawConsent, RawHelpRequest, RawHelper, RawToken, encode_dt, encode_skills, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A HelpNet store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Create or replace a user's metrics.
  ///
  /// Metrics belong to the wider platform; this writer exists for seeding and
  /// for the platform jobs that maintain them.
  pub async fn put_metrics(&self, user_id: Uuid, metrics: UserMetrics) -> Result<()> {
    let id_str = encode_uuid(user_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO user_metrics (user_id, invite_success_rate, spam_reports, karma_score)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (user_id) DO UPDATE SET
             invite_success_rate = excluded.invite_success_rate,
             spam_reports        = excluded.spam_reports,
             karma_score         = excluded.karma_score",
          rusqlite::params![
            id_str,
            metrics.invite_success_rate,
            metrics.spam_reports,
            metrics.karma_score,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Profiles whose coordinates fall in the bounding box of a circle. The
  /// longitude test takes both halves of a box that wraps the antimeridian.
  async fn helpers_in_box(&self, point: GeoPoint, radius_km: f64) -> Result<Vec<HelperProfile>> {
    let bbox = point.bounding_box(radius_km);

    let raws: Vec<RawHelper> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id, lat, lon, skills, karma_score, availability_score FROM helpers
           WHERE lat BETWEEN ?1 AND ?2
             AND ((?3 <= ?4 AND lon BETWEEN ?3 AND ?4) OR (?3 > ?4 AND (lon >= ?3 OR lon <= ?4)))",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon],
            |row| {
              Ok(RawHelper {
                id:                 row.get(0)?,
                lat:                row.get(1)?,
                lon:                row.get(2)?,
                skills:             row.get(3)?,
                karma_score:        row.get(4)?,
                availability_score: row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHelper::into_profile).collect()
  }
}

// ─── ConsentStore ────────────────────────────────────────────────────────────

impl ConsentStore for SqliteStore {
  type Error = crate::Error;

  async fn get_consent(&self, user_id: Uuid, provider_id: &str) -> Result<Option<ConsentRecord>> {
    let user_str = encode_uuid(user_id);
    let provider = provider_id.to_owned();

    let raw: Option<RawConsent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, provider_id, granted, granted_at, revoked_at FROM consents
             WHERE user_id = ?1 AND provider_id = ?2",
            rusqlite::params![user_str, provider],
            |row| {
              Ok(RawConsent {
                user_id:     row.get(0)?,
                provider_id: row.get(1)?,
                granted:     row.get(2)?,
                granted_at:  row.get(3)?,
                revoked_at:  row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawConsent::into_record).transpose()
  }

  async fn put_consent(&self, record: ConsentRecord) -> Result<()> {
    let user_str = encode_uuid(record.user_id);
    let granted_at = encode_dt(record.granted_at);
    let revoked_at = record.revoked_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO consents (user_id, provider_id, granted, granted_at, revoked_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (user_id, provider_id) DO UPDATE SET
             granted    = excluded.granted,
             granted_at = excluded.granted_at,
             revoked_at = excluded.revoked_at",
          rusqlite::params![user_str, record.provider_id, record.granted, granted_at, revoked_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TokenStore ──────────────────────────────────────────────────────────────

impl TokenStore for SqliteStore {
  type Error = crate::Error;

  async fn get_token(&self, user_id: Uuid, provider_id: &str) -> Result<Option<TokenRecord>> {
    let user_str = encode_uuid(user_id);
    let provider = provider_id.to_owned();

    let raw: Option<RawToken> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, provider_id, access_token_enc, refresh_token_enc, expires_at, stored_at
             FROM tokens WHERE user_id = ?1 AND provider_id = ?2",
            rusqlite::params![user_str, provider],
            |row| {
              Ok(RawToken {
                user_id:           row.get(0)?,
                provider_id:       row.get(1)?,
                access_token_enc:  row.get(2)?,
                refresh_token_enc: row.get(3)?,
                expires_at:        row.get(4)?,
                stored_at:         row.get(5)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawToken::into_record).transpose()
  }

  async fn put_token(&self, record: TokenRecord) -> Result<()> {
    let user_str = encode_uuid(record.user_id);
    let expires_at = record.expires_at.map(encode_dt);
    let stored_at = encode_dt(record.stored_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO tokens
             (user_id, provider_id, access_token_enc, refresh_token_enc, expires_at, stored_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (user_id, provider_id) DO UPDATE SET
             access_token_enc  = excluded.access_token_enc,
             refresh_token_enc = excluded.refresh_token_enc,
             expires_at        = excluded.expires_at,
             stored_at         = excluded.stored_at",
          rusqlite::params![
            user_str,
            record.provider_id,
            record.access_token_enc,
            record.refresh_token_enc,
            expires_at,
            stored_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_token(&self, user_id: Uuid, provider_id: &str) -> Result<bool> {
    let user_str = encode_uuid(user_id);
    let provider = provider_id.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM tokens WHERE user_id = ?1 AND provider_id = ?2",
          rusqlite::params![user_str, provider],
        )?)
      })
      .await?;
    Ok(deleted > 0)
  }
}

// ─── MetricsStore ────────────────────────────────────────────────────────────

impl MetricsStore for SqliteStore {
  type Error = crate::Error;

  async fn get_metrics(&self, user_id: Uuid) -> Result<Option<UserMetrics>> {
    let id_str = encode_uuid(user_id);

    let metrics = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT invite_success_rate, spam_reports, karma_score FROM user_metrics
             WHERE user_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(UserMetrics {
                invite_success_rate: row.get(0)?,
                spam_reports:        row.get(1)?,
                karma_score:         row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;
    Ok(metrics)
  }

  async fn record_invite(&self, record: InviteRecord) -> Result<()> {
    let invite_str = encode_uuid(record.invite_id);
    let user_str = encode_uuid(record.user_id);
    let sent_at = encode_dt(record.sent_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO invites (invite_id, user_id, provider_id, external_id, sent_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![invite_str, user_str, record.provider_id, record.external_id, sent_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn count_invites_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<u32> {
    let user_str = encode_uuid(user_id);
    let since_str = encode_dt(since);

    let count: u32 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM invites WHERE user_id = ?1 AND sent_at >= ?2",
          rusqlite::params![user_str, since_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count)
  }
}

// ─── HelpRequestStore ────────────────────────────────────────────────────────

impl HelpRequestStore for SqliteStore {
  type Error = crate::Error;

  async fn insert_request(&self, request: HelpRequest) -> Result<()> {
    let id_str = encode_uuid(request.id);
    let requester_str = encode_uuid(request.requester_id);
    let category = request.category.as_ref().to_owned();
    let status = request.status.as_ref().to_owned();
    let created_at = encode_dt(request.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO help_requests (
             id, requester_id, category, urgency, title, description,
             lat, lon, status, confidence, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          rusqlite::params![
            id_str,
            requester_str,
            category,
            request.urgency.get(),
            request.title,
            request.description,
            request.location.lat,
            request.location.lon,
            status,
            request.confidence,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_request(&self, id: Uuid) -> Result<Option<HelpRequest>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawHelpRequest> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM help_requests WHERE id = ?1", RawHelpRequest::COLUMNS);
        Ok(conn
          .query_row(&sql, rusqlite::params![id_str], RawHelpRequest::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawHelpRequest::into_request).transpose()
  }

  async fn update_status(&self, id: Uuid, from: HelpStatus, to: HelpStatus) -> Result<bool> {
    let id_str = encode_uuid(id);
    let from_str = from.as_ref().to_owned();
    let to_str = to.as_ref().to_owned();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE help_requests SET status = ?3 WHERE id = ?1 AND status = ?2",
          rusqlite::params![id_str, from_str, to_str],
        )?)
      })
      .await?;
    Ok(updated == 1)
  }
}

// ─── GeoIndex ────────────────────────────────────────────────────────────────

impl GeoIndex for SqliteStore {
  type Error = crate::Error;

  async fn upsert_helper(&self, profile: HelperProfile) -> Result<()> {
    profile.location.validate()?;
    let id_str = encode_uuid(profile.id);
    let skills = encode_skills(&profile.skills)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO helpers (id, lat, lon, skills, karma_score, availability_score)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (id) DO UPDATE SET
             lat                = excluded.lat,
             lon                = excluded.lon,
             skills             = excluded.skills,
             karma_score        = excluded.karma_score,
             availability_score = excluded.availability_score",
          rusqlite::params![
            id_str,
            profile.location.lat,
            profile.location.lon,
            skills,
            profile.karma_score,
            profile.availability_score,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Bounding-box prefilter in SQL, exact haversine check in Rust.
  ///
  /// Every skill is returned; `category` is not used to narrow the search.
  async fn find_nearby(
    &self,
    point: GeoPoint,
    max_distance_km: f64,
    _category: HelpCategory,
    limit: usize,
  ) -> Result<Vec<HelperCandidate>> {
    point.validate()?;
    if !(max_distance_km >= 0.0) || limit == 0 {
      return Ok(Vec::new());
    }

    let mut candidates: Vec<HelperCandidate> = self
      .helpers_in_box(point, max_distance_km)
      .await?
      .iter()
      .map(|profile| profile.candidate_from(&point))
      .filter(|c| c.distance_km <= max_distance_km)
      .collect();

    candidates.sort_by(|a, b| {
      a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(limit);

    tracing::debug!(
      lat = point.lat,
      lon = point.lon,
      max_distance_km,
      found = candidates.len(),
      "nearby helper query"
    );
    Ok(candidates)
  }

  /// A request counts when it is open and either categorised `urgent` or at
  /// least `min_urgency`.
  async fn count_open_urgent(&self, point: GeoPoint, radius_km: f64, min_urgency: u8) -> Result<u32> {
    point.validate()?;
    let bbox = point.bounding_box(radius_km);

    let locations: Vec<(f64, f64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT lat, lon FROM help_requests
           WHERE status = 'open'
             AND (urgency >= ?1 OR category = 'urgent')
             AND lat BETWEEN ?2 AND ?3
             AND ((?4 <= ?5 AND lon BETWEEN ?4 AND ?5) OR (?4 > ?5 AND (lon >= ?4 OR lon <= ?5)))",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![min_urgency, bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let count = locations
      .into_iter()
      .filter(|(lat, lon)| point.distance_km(&GeoPoint { lat: *lat, lon: *lon }) <= radius_km)
      .count();
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
  }
}
