//! Intake and lifecycle of help requests.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use helpnet_core::{
  collab::{Classifier, Notifier},
  help::{HelpCategory, HelpRequest, HelpStatus, NewHelpRequest, Urgency},
  store::HelpRequestStore,
};
use uuid::Uuid;

use crate::{Error, Result};

/// Urgency given to requests that neither state one nor go through the
/// classifier.
pub const DEFAULT_URGENCY: u8 = 5;

/// Urgency from which a new request alerts nearby helpers.
pub const DEFAULT_ALERT_URGENCY: u8 = 8;

pub struct HelpDesk<S, C, N> {
  store:         Arc<S>,
  classifier:    Arc<C>,
  notifier:      Arc<N>,
  alert_urgency: Urgency,
}

impl<S, C, N> Clone for HelpDesk<S, C, N> {
  fn clone(&self) -> Self {
    Self {
      store:         Arc::clone(&self.store),
      classifier:    Arc::clone(&self.classifier),
      notifier:      Arc::clone(&self.notifier),
      alert_urgency: self.alert_urgency,
    }
  }
}

impl<S, C, N> HelpDesk<S, C, N>
where
  S: HelpRequestStore,
  C: Classifier,
  N: Notifier + 'static,
{
  pub fn new(store: Arc<S>, classifier: Arc<C>, notifier: Arc<N>) -> Self {
    Self {
      store,
      classifier,
      notifier,
      alert_urgency: Urgency::saturating(f64::from(DEFAULT_ALERT_URGENCY)),
    }
  }

  pub fn with_alert_urgency(mut self, urgency: Urgency) -> Self {
    self.alert_urgency = urgency;
    self
  }

  /// Validate, classify when needed, and store a new open request.
  ///
  /// Urgent requests alert nearby helpers in the background; a failing
  /// notifier is logged and never fails the submission.
  pub async fn submit(&self, requester_id: Uuid, new: NewHelpRequest) -> Result<HelpRequest> {
    new.location.validate()?;
    let title = new.title.trim();
    if title.is_empty() {
      return Err(Error::InvalidRequest("title must not be empty".into()));
    }
    let description = new
      .description
      .as_deref()
      .map(str::trim)
      .filter(|d| !d.is_empty())
      .map(str::to_owned);
    let stated_urgency = new.urgency.map(Urgency::new).transpose()?;

    let (category, urgency, confidence) = match new.category {
      Some(category) => {
        let urgency = stated_urgency.unwrap_or_else(|| default_urgency(category));
        (category, urgency, None)
      }
      None => {
        let text = match &description {
          Some(d) => format!("{title}\n{d}"),
          None => title.to_owned(),
        };
        let guess = self
          .classifier
          .classify(&text)
          .await
          .map_err(|e| Error::Classifier(Box::new(e)))?;
        tracing::debug!(category = %guess.category, confidence = guess.confidence, "request classified");
        (guess.category, stated_urgency.unwrap_or(guess.urgency), Some(guess.confidence.clamp(0.0, 1.0)))
      }
    };

    let request = HelpRequest {
      id: Uuid::new_v4(),
      requester_id,
      category,
      urgency,
      location: new.location,
      status: HelpStatus::Open,
      title: title.to_owned(),
      description,
      confidence,
      // Stored with microsecond precision.
      created_at: Utc::now().trunc_subsecs(6),
    };
    self.store.insert_request(request.clone()).await.map_err(Error::store)?;
    tracing::info!(id = %request.id, %category, urgency = urgency.get(), "help request submitted");

    if category == HelpCategory::Urgent || urgency >= self.alert_urgency {
      self.alert_nearby(&request);
    }
    Ok(request)
  }

  fn alert_nearby(&self, request: &HelpRequest) {
    let notifier = Arc::clone(&self.notifier);
    let (id, point) = (request.id, request.location);
    tokio::spawn(async move {
      match notifier.notify_nearby(point).await {
        Ok(()) => tracing::debug!(%id, "nearby helpers notified"),
        Err(e) => tracing::warn!(%id, error = %e, "notifying nearby helpers failed"),
      }
    });
  }

  pub async fn get(&self, id: Uuid) -> Result<HelpRequest> {
    self
      .store
      .get_request(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::Core(helpnet_core::Error::RequestNotFound(id)))
  }

  /// Move a request along its lifecycle. The store update only applies if
  /// nobody changed the status in between.
  pub async fn transition(&self, id: Uuid, next: HelpStatus) -> Result<HelpRequest> {
    let mut request = self.get(id).await?;
    let from = request.status;
    request.transition(next)?;

    let applied = self.store.update_status(id, from, next).await.map_err(Error::store)?;
    if !applied {
      return Err(Error::Conflict(id));
    }
    tracing::info!(%id, %from, to = %next, "help request status changed");
    Ok(request)
  }
}

fn default_urgency(category: HelpCategory) -> Urgency {
  match category {
    HelpCategory::Urgent => Urgency::MAX,
    _ => Urgency::saturating(f64::from(DEFAULT_URGENCY)),
  }
}

#[cfg(test)]
mod tests {
  use std::{convert::Infallible, future::Future, time::Duration};

  use helpnet_core::geo::GeoPoint;
  use helpnet_store_sqlite::SqliteStore;
  use tokio::sync::mpsc;

  use super::*;
  use crate::classify::KeywordClassifier;

  struct ChannelNotifier(mpsc::UnboundedSender<GeoPoint>);

  impl Notifier for ChannelNotifier {
    type Error = Infallible;

    fn notify_nearby(&self, point: GeoPoint) -> impl Future<Output = Result<(), Infallible>> + Send + '_ {
      let _ = self.0.send(point);
      async { Ok(()) }
    }
  }

  #[derive(Debug, thiserror::Error)]
  #[error("push gateway unreachable")]
  struct Unreachable;

  struct FailingNotifier;

  impl Notifier for FailingNotifier {
    type Error = Unreachable;

    fn notify_nearby(&self, _point: GeoPoint) -> impl Future<Output = Result<(), Unreachable>> + Send + '_ {
      async { Err(Unreachable) }
    }
  }

  async fn desk() -> (
    HelpDesk<SqliteStore, KeywordClassifier, ChannelNotifier>,
    mpsc::UnboundedReceiver<GeoPoint>,
  ) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    let desk = HelpDesk::new(store, Arc::new(KeywordClassifier::default()), Arc::new(ChannelNotifier(tx)));
    (desk, rx)
  }

  fn here() -> GeoPoint { GeoPoint::new(45.76, 4.84).unwrap() }

  fn new_request(title: &str, category: Option<HelpCategory>, urgency: Option<i64>) -> NewHelpRequest {
    NewHelpRequest {
      title: title.into(),
      description: None,
      category,
      urgency,
      location: here(),
    }
  }

  #[tokio::test]
  async fn stated_category_skips_the_classifier() {
    let (desk, _rx) = desk().await;
    let req = desk
      .submit(Uuid::new_v4(), new_request("  Homework help  ", Some(HelpCategory::Education), None))
      .await
      .unwrap();
    assert_eq!(req.status, HelpStatus::Open);
    assert_eq!(req.title, "Homework help");
    assert_eq!(req.urgency.get(), DEFAULT_URGENCY);
    assert_eq!(req.confidence, None);
    assert_eq!(desk.get(req.id).await.unwrap(), req);
  }

  #[tokio::test]
  async fn missing_category_is_inferred() {
    let (desk, _rx) = desk().await;
    let mut new = new_request("Need a pharmacy run", None, None);
    new.description = Some("My medicine ran out".into());
    let req = desk.submit(Uuid::new_v4(), new).await.unwrap();
    assert_eq!(req.category, HelpCategory::Health);
    assert_eq!(req.confidence, Some(1.0));
  }

  #[tokio::test]
  async fn invalid_input_is_rejected() {
    let (desk, _rx) = desk().await;
    let user = Uuid::new_v4();
    assert!(matches!(
      desk.submit(user, new_request("x", Some(HelpCategory::Food), Some(11))).await,
      Err(Error::Core(helpnet_core::Error::InvalidUrgency(11)))
    ));
    assert!(matches!(
      desk.submit(user, new_request("   ", Some(HelpCategory::Food), None)).await,
      Err(Error::InvalidRequest(_))
    ));
    let mut off_map = new_request("x", None, None);
    off_map.location = GeoPoint { lat: 0.0, lon: 200.0 };
    assert!(matches!(
      desk.submit(user, off_map).await,
      Err(Error::Core(helpnet_core::Error::InvalidCoordinates { .. }))
    ));
  }

  #[tokio::test]
  async fn urgent_requests_alert_nearby_helpers() {
    let (desk, mut rx) = desk().await;
    desk
      .submit(Uuid::new_v4(), new_request("SOS", Some(HelpCategory::Urgent), None))
      .await
      .unwrap();
    let point = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(point, here());

    desk
      .submit(Uuid::new_v4(), new_request("Flooded basement", Some(HelpCategory::Climate), Some(9)))
      .await
      .unwrap();
    assert!(tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn calm_requests_do_not_alert() {
    let (desk, mut rx) = desk().await;
    desk
      .submit(Uuid::new_v4(), new_request("Bread", Some(HelpCategory::Food), Some(3)))
      .await
      .unwrap();
    drop(desk);
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn notifier_failure_does_not_fail_submission() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let desk = HelpDesk::new(Arc::clone(&store), Arc::new(KeywordClassifier::default()), Arc::new(FailingNotifier));
    let req = desk
      .submit(Uuid::new_v4(), new_request("SOS", Some(HelpCategory::Urgent), None))
      .await
      .unwrap();
    assert_eq!(req.urgency, Urgency::MAX);
    tokio::task::yield_now().await;
    assert_eq!(desk.get(req.id).await.unwrap().status, HelpStatus::Open);
  }

  #[tokio::test]
  async fn lifecycle_is_enforced() {
    let (desk, _rx) = desk().await;
    let req = desk
      .submit(Uuid::new_v4(), new_request("Rent", Some(HelpCategory::Finance), None))
      .await
      .unwrap();

    assert!(matches!(
      desk.transition(req.id, HelpStatus::Resolved).await,
      Err(Error::Core(helpnet_core::Error::InvalidTransition { .. }))
    ));
    assert_eq!(desk.transition(req.id, HelpStatus::InProgress).await.unwrap().status, HelpStatus::InProgress);
    assert_eq!(desk.transition(req.id, HelpStatus::Resolved).await.unwrap().status, HelpStatus::Resolved);
    assert!(desk.transition(req.id, HelpStatus::Cancelled).await.is_err());
    assert_eq!(desk.get(req.id).await.unwrap().status, HelpStatus::Resolved);

    let missing = desk.transition(Uuid::new_v4(), HelpStatus::Cancelled).await.unwrap_err();
    assert_eq!(missing.kind(), "not_found");
  }
}
