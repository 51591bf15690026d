//! Handlers for help requests, matching and urgency.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/requests` | Body: [`SubmitBody`]; returns 201 + stored request |
//! | `GET`  | `/requests/:id` | 404 if not found |
//! | `POST` | `/requests/:id/status` | Body: `{"status":"in_progress"}`; 409 on invalid moves |
//! | `GET`  | `/requests/:id/matches` | Optional `max_km`, `limit` |
//! | `GET`  | `/matches` | `?lat&lon&category`, optional `max_km`, `limit` |
//! | `PUT`  | `/helpers/:id` | Body: [`HelperBody`] |
//! | `GET`  | `/urgency` | Current local urgency state |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use helpnet_core::{
  geo::GeoPoint,
  help::{HelpCategory, HelpRequest, HelpStatus, NewHelpRequest},
  matching::{HelperProfile, ScoredCandidate},
  store::GeoIndex,
};
use helpnet_match::{
  UrgencyState,
  matcher::{DEFAULT_LIMIT, DEFAULT_MAX_DISTANCE_KM},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, Stack, error::ApiError};

// ─── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub requester_id: Uuid,
  pub title:        String,
  pub description:  Option<String>,
  /// Inferred from the text when absent.
  pub category:     Option<HelpCategory>,
  pub urgency:      Option<i64>,
  pub location:     GeoPoint,
}

impl From<SubmitBody> for NewHelpRequest {
  fn from(b: SubmitBody) -> Self {
    NewHelpRequest {
      title:       b.title,
      description: b.description,
      category:    b.category,
      urgency:     b.urgency,
      location:    b.location,
    }
  }
}

/// `POST /requests`
pub async fn submit<T: Stack>(
  State(state): State<AppState<T>>,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError> {
  let requester = body.requester_id;
  let request = state.desk.submit(requester, NewHelpRequest::from(body)).await?;
  Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /requests/:id`
pub async fn get_one<T: Stack>(
  State(state): State<AppState<T>>,
  Path(id): Path<Uuid>,
) -> Result<Json<HelpRequest>, ApiError> {
  Ok(Json(state.desk.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
  pub status: HelpStatus,
}

/// `POST /requests/:id/status`
pub async fn transition<T: Stack>(
  State(state): State<AppState<T>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TransitionBody>,
) -> Result<Json<HelpRequest>, ApiError> {
  Ok(Json(state.desk.transition(id, body.status).await?))
}

// ─── Matching ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RangeParams {
  pub max_km: Option<f64>,
  pub limit:  Option<usize>,
}

/// `GET /requests/:id/matches[?max_km=..][&limit=..]`
pub async fn request_matches<T: Stack>(
  State(state): State<AppState<T>>,
  Path(id): Path<Uuid>,
  Query(range): Query<RangeParams>,
) -> Result<Json<Vec<ScoredCandidate>>, ApiError> {
  let request = state.desk.get(id).await?;
  let ranked = state.matcher.match_request(&request, range.max_km, range.limit).await?;
  Ok(Json(ranked))
}

#[derive(Debug, Deserialize)]
pub struct MatchParams {
  pub lat:      f64,
  pub lon:      f64,
  pub category: HelpCategory,
  pub max_km:   Option<f64>,
  pub limit:    Option<usize>,
}

/// `GET /matches?lat=..&lon=..&category=..`
pub async fn matches<T: Stack>(
  State(state): State<AppState<T>>,
  Query(params): Query<MatchParams>,
) -> Result<Json<Vec<ScoredCandidate>>, ApiError> {
  let ranked = state
    .matcher
    .find_candidates(
      GeoPoint { lat: params.lat, lon: params.lon },
      params.max_km.unwrap_or(DEFAULT_MAX_DISTANCE_KM),
      params.category,
      params.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await?;
  Ok(Json(ranked))
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HelperBody {
  pub location:           GeoPoint,
  #[serde(default)]
  pub skills:             Vec<HelpCategory>,
  #[serde(default)]
  pub karma_score:        f64,
  #[serde(default)]
  pub availability_score: f64,
}

/// `PUT /helpers/:id`
pub async fn upsert_helper<T: Stack>(
  State(state): State<AppState<T>>,
  Path(id): Path<Uuid>,
  Json(body): Json<HelperBody>,
) -> Result<Json<HelperProfile>, ApiError> {
  body
    .location
    .validate()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  if !(0.0..=1.0).contains(&body.availability_score) {
    return Err(ApiError::BadRequest("availability_score must be within [0, 1]".into()));
  }
  if !(body.karma_score >= 0.0) {
    return Err(ApiError::BadRequest("karma_score must not be negative".into()));
  }

  let profile = HelperProfile {
    id,
    location: body.location,
    skills: body.skills,
    karma_score: body.karma_score,
    availability_score: body.availability_score,
  };
  state.store.upsert_helper(profile.clone()).await.map_err(ApiError::store)?;
  Ok(Json(profile))
}

// ─── Urgency ──────────────────────────────────────────────────────────────────

/// `GET /urgency`
pub async fn urgency<T: Stack>(State(state): State<AppState<T>>) -> Json<UrgencyState> {
  Json(*state.urgency.borrow())
}
