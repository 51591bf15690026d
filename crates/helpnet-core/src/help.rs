//! Help requests and their status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::{Error, Result, geo::GeoPoint};

// ─── Category ────────────────────────────────────────────────────────────────

/// What kind of help is needed. Also used as a helper skill tag.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HelpCategory {
  Food,
  Health,
  Shelter,
  Education,
  Climate,
  Finance,
  Urgent,
}

impl HelpCategory {
  pub fn parse(s: &str) -> Result<Self> {
    s.trim()
      .to_ascii_lowercase()
      .parse()
      .map_err(|_| Error::UnknownCategory(s.to_owned()))
  }
}

// ─── Urgency ─────────────────────────────────────────────────────────────────

/// Urgency on a 1–10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Urgency(u8);

impl Urgency {
  pub const MIN: Urgency = Urgency(1);
  pub const MAX: Urgency = Urgency(10);

  pub fn new(value: i64) -> Result<Self> {
    if (1..=10).contains(&value) {
      Ok(Self(value as u8))
    } else {
      Err(Error::InvalidUrgency(value))
    }
  }

  /// Clamp an arbitrary score (e.g. a model output) onto the scale.
  pub fn saturating(value: f64) -> Self {
    if value.is_nan() {
      return Self::MIN;
    }
    Self(value.round().clamp(1.0, 10.0) as u8)
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<i64> for Urgency {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> { Self::new(value) }
}

impl From<Urgency> for u8 {
  fn from(u: Urgency) -> u8 { u.0 }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HelpStatus {
  Open,
  InProgress,
  Resolved,
  Cancelled,
}

impl HelpStatus {
  /// Transitions are monotonic: `open → in_progress → resolved`, with
  /// `cancelled` reachable from the two non-terminal states.
  pub fn can_transition_to(self, next: HelpStatus) -> bool {
    use HelpStatus::*;
    matches!(
      (self, next),
      (Open, InProgress) | (InProgress, Resolved) | (Open, Cancelled) | (InProgress, Cancelled)
    )
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Resolved | Self::Cancelled) }
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A submitted need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpRequest {
  pub id:           Uuid,
  pub requester_id: Uuid,
  pub category:     HelpCategory,
  pub urgency:      Urgency,
  pub location:     GeoPoint,
  pub status:       HelpStatus,
  pub title:        String,
  pub description:  Option<String>,
  /// Classifier confidence when the category was inferred; `None` when the
  /// requester chose it.
  pub confidence:   Option<f64>,
  pub created_at:   DateTime<Utc>,
}

impl HelpRequest {
  /// Apply a status change, enforcing the lifecycle.
  pub fn transition(&mut self, next: HelpStatus) -> Result<()> {
    if !self.status.can_transition_to(next) {
      return Err(Error::InvalidTransition { id: self.id, from: self.status, to: next });
    }
    self.status = next;
    Ok(())
  }
}

/// Input for submitting a help request. The category may be left for the
/// classifier to infer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHelpRequest {
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub category:    Option<HelpCategory>,
  #[serde(default)]
  pub urgency:     Option<i64>,
  pub location:    GeoPoint,
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn category_parsing_is_case_insensitive() {
    assert_eq!(HelpCategory::parse(" Food ").unwrap(), HelpCategory::Food);
    assert!(matches!(HelpCategory::parse("pets"), Err(Error::UnknownCategory(_))));
    assert_eq!(HelpCategory::iter().count(), 7);
  }

  #[test]
  fn urgency_bounds() {
    assert!(Urgency::new(0).is_err());
    assert!(Urgency::new(11).is_err());
    assert_eq!(Urgency::new(10).unwrap().get(), 10);
    assert_eq!(Urgency::saturating(14.2), Urgency::MAX);
    assert_eq!(Urgency::saturating(0.2), Urgency::MIN);
    assert_eq!(Urgency::saturating(6.5).get(), 7);
  }

  #[test]
  fn urgency_rejects_out_of_range_json() {
    assert!(serde_json::from_str::<Urgency>("0").is_err());
    assert_eq!(serde_json::from_str::<Urgency>("7").unwrap().get(), 7);
  }

  #[test]
  fn status_transitions_are_monotonic() {
    use HelpStatus::*;
    assert!(Open.can_transition_to(InProgress));
    assert!(InProgress.can_transition_to(Resolved));
    assert!(Open.can_transition_to(Cancelled));
    assert!(InProgress.can_transition_to(Cancelled));

    assert!(!Open.can_transition_to(Resolved));
    assert!(!InProgress.can_transition_to(Open));
    assert!(!Resolved.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Open));
    assert!(!Open.can_transition_to(Open));
  }

  #[test]
  fn transition_reports_both_states() {
    let mut req = HelpRequest {
      id:           Uuid::new_v4(),
      requester_id: Uuid::new_v4(),
      category:     HelpCategory::Food,
      urgency:      Urgency::new(3).unwrap(),
      location:     GeoPoint::new(0.0, 0.0).unwrap(),
      status:       HelpStatus::Resolved,
      title:        "Groceries".into(),
      description:  None,
      confidence:   None,
      created_at:   Utc::now(),
    };
    let err = req.transition(HelpStatus::InProgress).unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidTransition { from: HelpStatus::Resolved, to: HelpStatus::InProgress, .. }
    ));
  }
}
