//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexical order matches chronological order.
//! Skill sets are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use helpnet_core::{
  consent::ConsentRecord,
  geo::GeoPoint,
  help::{HelpCategory, HelpRequest, HelpStatus, Urgency},
  token::TokenRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn decode_category(s: &str) -> Result<HelpCategory> {
  s.parse().map_err(|_| Error::UnknownValue { column: "category", value: s.to_owned() })
}

pub fn decode_status(s: &str) -> Result<HelpStatus> {
  s.parse().map_err(|_| Error::UnknownValue { column: "status", value: s.to_owned() })
}

// ─── Skills ───────────────────────────────────────────────────────────────────

pub fn encode_skills(skills: &[HelpCategory]) -> Result<String> {
  Ok(serde_json::to_string(skills)?)
}

pub fn decode_skills(s: &str) -> Result<Vec<HelpCategory>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ────────────────────────────────────────────────────────────────

/// Raw values read directly from a `consents` row.
pub struct RawConsent {
  pub user_id:     String,
  pub provider_id: String,
  pub granted:     bool,
  pub granted_at:  String,
  pub revoked_at:  Option<String>,
}

impl RawConsent {
  pub fn into_record(self) -> Result<ConsentRecord> {
    Ok(ConsentRecord {
      user_id:     decode_uuid(&self.user_id)?,
      provider_id: self.provider_id,
      granted:     self.granted,
      granted_at:  decode_dt(&self.granted_at)?,
      revoked_at:  self.revoked_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read directly from a `tokens` row.
pub struct RawToken {
  pub user_id:           String,
  pub provider_id:       String,
  pub access_token_enc:  String,
  pub refresh_token_enc: Option<String>,
  pub expires_at:        Option<String>,
  pub stored_at:         String,
}

impl RawToken {
  pub fn into_record(self) -> Result<TokenRecord> {
    Ok(TokenRecord {
      user_id:           decode_uuid(&self.user_id)?,
      provider_id:       self.provider_id,
      access_token_enc:  self.access_token_enc,
      refresh_token_enc: self.refresh_token_enc,
      expires_at:        self.expires_at.as_deref().map(decode_dt).transpose()?,
      stored_at:         decode_dt(&self.stored_at)?,
    })
  }
}

/// Raw values read directly from a `help_requests` row.
pub struct RawHelpRequest {
  pub id:           String,
  pub requester_id: String,
  pub category:     String,
  pub urgency:      i64,
  pub title:        String,
  pub description:  Option<String>,
  pub lat:          f64,
  pub lon:          f64,
  pub status:       String,
  pub confidence:   Option<f64>,
  pub created_at:   String,
}

impl RawHelpRequest {
  pub const COLUMNS: &'static str = "id, requester_id, category, urgency, title, description, \
                                     lat, lon, status, confidence, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      requester_id: row.get(1)?,
      category:     row.get(2)?,
      urgency:      row.get(3)?,
      title:        row.get(4)?,
      description:  row.get(5)?,
      lat:          row.get(6)?,
      lon:          row.get(7)?,
      status:       row.get(8)?,
      confidence:   row.get(9)?,
      created_at:   row.get(10)?,
    })
  }

  pub fn into_request(self) -> Result<HelpRequest> {
    Ok(HelpRequest {
      id:           decode_uuid(&self.id)?,
      requester_id: decode_uuid(&self.requester_id)?,
      category:     decode_category(&self.category)?,
      urgency:      Urgency::new(self.urgency)?,
      location:     GeoPoint::new(self.lat, self.lon)?,
      status:       decode_status(&self.status)?,
      title:        self.title,
      description:  self.description,
      confidence:   self.confidence,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `helpers` row.
pub struct RawHelper {
  pub id:                 String,
  pub lat:                f64,
  pub lon:                f64,
  pub skills:             String,
  pub karma_score:        f64,
  pub availability_score: f64,
}

impl RawHelper {
  pub fn into_profile(self) -> Result<helpnet_core::matching::HelperProfile> {
    Ok(helpnet_core::matching::HelperProfile {
      id:                 decode_uuid(&self.id)?,
      location:           GeoPoint::new(self.lat, self.lon)?,
      skills:             decode_skills(&self.skills)?,
      karma_score:        self.karma_score,
      availability_score: self.availability_score,
    })
  }
}
