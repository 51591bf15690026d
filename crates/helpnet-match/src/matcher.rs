//! Ranking of nearby helpers for a need.

use std::sync::Arc;

use helpnet_core::{
  geo::GeoPoint,
  help::{HelpCategory, HelpRequest},
  matching::{ScoredCandidate, match_score, rank_order},
  store::GeoIndex,
};

use crate::{Error, Result};

/// Search radius used when a caller does not give one.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 10.0;
/// Result size used when a caller does not give one.
pub const DEFAULT_LIMIT: usize = 20;

pub struct GeoMatcher<G> {
  index: Arc<G>,
}

impl<G> Clone for GeoMatcher<G> {
  fn clone(&self) -> Self { Self { index: Arc::clone(&self.index) } }
}

impl<G: GeoIndex> GeoMatcher<G> {
  pub fn new(index: Arc<G>) -> Self { Self { index } }

  /// Up to `limit` helpers within `max_distance_km` of `location`, scored
  /// for `category` and ranked best first.
  pub async fn find_candidates(
    &self,
    location: GeoPoint,
    max_distance_km: f64,
    category: HelpCategory,
    limit: usize,
  ) -> Result<Vec<ScoredCandidate>> {
    location.validate()?;
    if !(max_distance_km >= 0.0) || limit == 0 {
      return Ok(Vec::new());
    }

    let found = self
      .index
      .find_nearby(location, max_distance_km, category, limit)
      .await
      .map_err(Error::store)?;
    let returned = found.len();

    let mut ranked: Vec<ScoredCandidate> = found
      .into_iter()
      .filter(|c| c.distance_km.is_finite() && (0.0..=max_distance_km).contains(&c.distance_km))
      .map(|candidate| {
        let match_score = match_score(&candidate, category, max_distance_km);
        ScoredCandidate { candidate, match_score }
      })
      .collect();

    if ranked.len() < returned {
      tracing::warn!(
        dropped = returned - ranked.len(),
        max_distance_km,
        "geo index returned helpers outside the search radius"
      );
    }

    ranked.sort_by(rank_order);
    ranked.truncate(limit);
    tracing::debug!(%category, max_distance_km, ranked = ranked.len(), "candidates ranked");
    Ok(ranked)
  }

  /// [`find_candidates`](Self::find_candidates) for a stored request, with
  /// the default radius and limit when none are given.
  pub async fn match_request(
    &self,
    request: &HelpRequest,
    max_distance_km: Option<f64>,
    limit: Option<usize>,
  ) -> Result<Vec<ScoredCandidate>> {
    self
      .find_candidates(
        request.location,
        max_distance_km.unwrap_or(DEFAULT_MAX_DISTANCE_KM),
        request.category,
        limit.unwrap_or(DEFAULT_LIMIT),
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, future::Future};

  use chrono::Utc;
  use helpnet_core::{
    help::{HelpStatus, Urgency},
    matching::{HelperCandidate, HelperProfile},
  };
  use helpnet_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  /// Returns whatever it was built with, ignoring the query.
  struct CannedIndex(Vec<HelperCandidate>);

  impl GeoIndex for CannedIndex {
    type Error = Infallible;

    fn upsert_helper(
      &self,
      _profile: HelperProfile,
    ) -> impl Future<Output = Result<(), Infallible>> + Send + '_ {
      async { Ok(()) }
    }

    fn find_nearby(
      &self,
      _point: GeoPoint,
      _max_distance_km: f64,
      _category: HelpCategory,
      _limit: usize,
    ) -> impl Future<Output = Result<Vec<HelperCandidate>, Infallible>> + Send + '_ {
      async move { Ok(self.0.clone()) }
    }

    fn count_open_urgent(
      &self,
      _point: GeoPoint,
      _radius_km: f64,
      _min_urgency: u8,
    ) -> impl Future<Output = Result<u32, Infallible>> + Send + '_ {
      async { Ok(0) }
    }
  }

  fn candidate(distance_km: f64, skills: Vec<HelpCategory>, karma: f64, avail: f64) -> HelperCandidate {
    HelperCandidate {
      id: Uuid::new_v4(),
      distance_km,
      skills,
      karma_score: karma,
      availability_score: avail,
    }
  }

  fn origin() -> GeoPoint { GeoPoint::new(48.8566, 2.3522).unwrap() }

  #[tokio::test]
  async fn out_of_radius_results_are_dropped() {
    let index = CannedIndex(vec![
      candidate(2.0, vec![HelpCategory::Food], 800.0, 0.9),
      candidate(12.5, vec![HelpCategory::Food], 1000.0, 1.0),
      candidate(f64::NAN, vec![], 0.0, 0.0),
    ]);
    let matcher = GeoMatcher::new(Arc::new(index));
    let ranked = matcher
      .find_candidates(origin(), 10.0, HelpCategory::Food, 20)
      .await
      .unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].match_score, 88);
  }

  #[tokio::test]
  async fn ranking_is_by_score_then_distance() {
    let near_unskilled = candidate(1.0, vec![], 0.0, 0.5);
    let far_skilled = candidate(6.0, vec![HelpCategory::Health], 0.0, 0.5);
    let tie_a = candidate(3.0, vec![], 0.0, 0.2);
    let mut tie_b = tie_a.clone();
    tie_b.id = Uuid::new_v4();
    tie_b.distance_km = 3.0;

    let matcher = GeoMatcher::new(Arc::new(CannedIndex(vec![
      tie_a.clone(),
      near_unskilled.clone(),
      tie_b.clone(),
      far_skilled.clone(),
    ])));
    let ranked = matcher
      .find_candidates(origin(), 10.0, HelpCategory::Health, 10)
      .await
      .unwrap();

    let ids: Vec<Uuid> = ranked.iter().map(|s| s.candidate.id).collect();
    // far_skilled: 0.4·0.4 + 0.3 + 0.1 = 56; near_unskilled: 0.36 + 0.1 = 46;
    // ties: 0.28 + 0.04 = 32.
    assert_eq!(ids[0], far_skilled.id);
    assert_eq!(ids[1], near_unskilled.id);
    let (first, second) = if tie_a.id < tie_b.id { (tie_a.id, tie_b.id) } else { (tie_b.id, tie_a.id) };
    assert_eq!(&ids[2..], &[first, second]);
    assert!(ranked.windows(2).all(|w| w[0].match_score >= w[1].match_score));
  }

  #[tokio::test]
  async fn degenerate_queries_return_nothing() {
    let matcher = GeoMatcher::new(Arc::new(CannedIndex(vec![candidate(1.0, vec![], 0.0, 0.0)])));
    assert!(matcher.find_candidates(origin(), 10.0, HelpCategory::Food, 0).await.unwrap().is_empty());
    assert!(matcher.find_candidates(origin(), -1.0, HelpCategory::Food, 5).await.unwrap().is_empty());
    assert!(matcher.find_candidates(origin(), f64::NAN, HelpCategory::Food, 5).await.unwrap().is_empty());

    let bad = GeoPoint { lat: 123.0, lon: 0.0 };
    assert!(matches!(
      matcher.find_candidates(bad, 10.0, HelpCategory::Food, 5).await,
      Err(Error::Core(helpnet_core::Error::InvalidCoordinates { .. }))
    ));
  }

  #[tokio::test]
  async fn sqlite_index_end_to_end() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let here = origin();
    // Roughly 1.1 km and 3.3 km north, and one in London.
    let helpers = [
      (GeoPoint::new(48.8666, 2.3522).unwrap(), vec![HelpCategory::Food], 100.0, 0.5),
      (GeoPoint::new(48.8866, 2.3522).unwrap(), vec![HelpCategory::Food], 900.0, 1.0),
      (GeoPoint::new(51.5074, -0.1278).unwrap(), vec![HelpCategory::Food], 1000.0, 1.0),
    ];
    let mut ids = Vec::new();
    for (location, skills, karma_score, availability_score) in helpers {
      let id = Uuid::new_v4();
      ids.push(id);
      store
        .upsert_helper(HelperProfile { id, location, skills, karma_score, availability_score })
        .await
        .unwrap();
    }

    let request = HelpRequest {
      id:           Uuid::new_v4(),
      requester_id: Uuid::new_v4(),
      category:     HelpCategory::Food,
      urgency:      Urgency::new(5).unwrap(),
      location:     here,
      status:       HelpStatus::Open,
      title:        "Groceries".into(),
      description:  None,
      confidence:   None,
      created_at:   Utc::now(),
    };
    let ranked = GeoMatcher::new(store).match_request(&request, None, None).await.unwrap();

    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|s| s.candidate.distance_km <= DEFAULT_MAX_DISTANCE_KM));
    assert!(ranked.iter().all(|s| s.match_score <= 100));
    // The further helper wins on availability and karma.
    assert_eq!(ranked[0].candidate.id, ids[1]);
    assert_eq!(ranked[1].candidate.id, ids[0]);
  }
}
