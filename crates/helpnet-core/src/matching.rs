//! Helper candidates and the deterministic match score.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{geo::GeoPoint, help::HelpCategory};

/// Weight of proximity in the match score.
pub const DISTANCE_WEIGHT: f64 = 0.4;
/// Weight of the skill match.
pub const SKILL_WEIGHT: f64 = 0.3;
/// Weight of the availability signal.
pub const AVAILABILITY_WEIGHT: f64 = 0.2;
/// Weight of reputation.
pub const KARMA_WEIGHT: f64 = 0.1;
/// Karma at which the reputation term reaches its full weight.
pub const KARMA_SCALE: f64 = 1000.0;

/// A potential helper as stored in the geo index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperProfile {
  pub id:                 Uuid,
  pub location:           GeoPoint,
  pub skills:             Vec<HelpCategory>,
  pub karma_score:        f64,
  pub availability_score: f64,
}

/// A helper found near a need. Produced per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperCandidate {
  pub id:                 Uuid,
  pub distance_km:        f64,
  pub skills:             Vec<HelpCategory>,
  pub karma_score:        f64,
  pub availability_score: f64,
}

impl HelperProfile {
  /// Project this profile into a candidate relative to `origin`.
  pub fn candidate_from(&self, origin: &GeoPoint) -> HelperCandidate {
    HelperCandidate {
      id:                 self.id,
      distance_km:        origin.distance_km(&self.location),
      skills:             self.skills.clone(),
      karma_score:        self.karma_score,
      availability_score: self.availability_score,
    }
  }
}

/// A candidate together with its score for one need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
  #[serde(flatten)]
  pub candidate:   HelperCandidate,
  pub match_score: u8,
}

fn finite_or_zero(x: f64) -> f64 { if x.is_finite() { x } else { 0.0 } }

/// Score `candidate` for a need of `category` searched within
/// `max_distance_km`.
///
/// `0.4·(1 − d/max) + 0.3·skill + 0.2·availability + 0.1·karma/1000`, clamped
/// to `[0, 1]`, scaled to 100 and rounded. Always in `0..=100`.
pub fn match_score(
  candidate: &HelperCandidate,
  category: HelpCategory,
  max_distance_km: f64,
) -> u8 {
  let distance = candidate.distance_km;
  let proximity = if !distance.is_finite() {
    0.0
  } else if max_distance_km > 0.0 && max_distance_km.is_finite() {
    (1.0 - distance.max(0.0) / max_distance_km).clamp(0.0, 1.0)
  } else if distance <= 0.0 {
    1.0
  } else {
    0.0
  };
  let skill = if candidate.skills.contains(&category) { 1.0 } else { 0.0 };
  let availability = finite_or_zero(candidate.availability_score).clamp(0.0, 1.0);
  let karma = finite_or_zero(candidate.karma_score).max(0.0) / KARMA_SCALE;

  let raw = DISTANCE_WEIGHT * proximity
    + SKILL_WEIGHT * skill
    + AVAILABILITY_WEIGHT * availability
    + KARMA_WEIGHT * karma;

  (raw.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Ranking order: score descending, then distance ascending, then id.
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
  b.match_score
    .cmp(&a.match_score)
    .then_with(|| a.candidate.distance_km.total_cmp(&b.candidate.distance_km))
    .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}
