//! Local urgency detection.
//!
//! The monitor polls the geo index for open urgent requests around a fixed
//! point. When enough of them cluster together it raises an alert that
//! stays up for a countdown window and then falls back to quiet on its own.
//! Every qualifying poll re-arms the countdown.
//!
//! The current state is published on a [`watch`] channel; subscribers see
//! only changes.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use helpnet_core::{geo::GeoPoint, store::GeoIndex};
use serde::Serialize;
use tokio::{
  sync::watch,
  time::{Instant, MissedTickBehavior},
};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrgencySettings {
  pub center:        GeoPoint,
  pub radius_km:     f64,
  /// Alert when at least this many urgent requests are open nearby.
  pub threshold:     u32,
  /// Urgency from which an open request counts; `urgent`-category
  /// requests always count.
  pub min_urgency:   u8,
  pub poll_interval: Duration,
  pub countdown:     Duration,
}

impl UrgencySettings {
  pub fn around(center: GeoPoint) -> Self {
    Self {
      center,
      radius_km: 5.0,
      threshold: 3,
      min_urgency: 8,
      poll_interval: Duration::from_secs(30),
      countdown: Duration::from_secs(300),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UrgencyState {
  Quiet,
  Alerting {
    /// Urgent requests counted by the poll that last armed the alert.
    count:      u32,
    expires_at: DateTime<Utc>,
  },
}

impl UrgencyState {
  pub fn is_alerting(&self) -> bool { matches!(self, Self::Alerting { .. }) }
}

pub struct UrgencyMonitor<G> {
  index:    Arc<G>,
  settings: UrgencySettings,
  state:    watch::Sender<UrgencyState>,
  deadline: Option<Instant>,
}

impl<G: GeoIndex> UrgencyMonitor<G> {
  pub fn new(index: Arc<G>, settings: UrgencySettings) -> Self {
    let (state, _) = watch::channel(UrgencyState::Quiet);
    Self { index, settings, state, deadline: None }
  }

  pub fn settings(&self) -> &UrgencySettings { &self.settings }

  pub fn subscribe(&self) -> watch::Receiver<UrgencyState> { self.state.subscribe() }

  pub fn current(&self) -> UrgencyState { *self.state.borrow() }

  /// Poll once and update the state.
  pub async fn tick(&mut self) -> Result<UrgencyState> {
    let s = &self.settings;
    let count = self
      .index
      .count_open_urgent(s.center, s.radius_km, s.min_urgency)
      .await
      .map_err(Error::store)?;
    tracing::debug!(count, threshold = s.threshold, "urgency poll");

    let now = Instant::now();
    if count >= self.settings.threshold {
      self.arm(count, now);
    } else {
      self.expire(now);
    }
    Ok(self.current())
  }

  fn arm(&mut self, count: u32, now: Instant) {
    let countdown = self.settings.countdown;
    self.deadline = Some(now + countdown);
    let expires_at = Utc::now() + chrono::Duration::from_std(countdown).unwrap_or(chrono::Duration::zero());
    if !self.current().is_alerting() {
      tracing::warn!(count, ?countdown, "local urgency alert raised");
    }
    self.state.send_replace(UrgencyState::Alerting { count, expires_at });
  }

  /// Drop back to quiet once the countdown has elapsed.
  fn expire(&mut self, now: Instant) {
    if self.deadline.is_some_and(|deadline| now < deadline) {
      return;
    }
    self.deadline = None;
    let changed = self.state.send_if_modified(|state| {
      let was_alerting = state.is_alerting();
      *state = UrgencyState::Quiet;
      was_alerting
    });
    if changed {
      tracing::info!("local urgency alert expired");
    }
  }

  /// Poll every `poll_interval` until `shutdown` resolves, expiring the
  /// alert as soon as its countdown runs out.
  pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
    let mut interval = tokio::time::interval(self.settings.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
      let deadline = self.deadline;
      tokio::select! {
        () = &mut shutdown => break,
        _ = interval.tick() => {
          if let Err(e) = self.tick().await {
            tracing::warn!(error = %e, "urgency poll failed");
            self.expire(Instant::now());
          }
        }
        () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
          self.expire(Instant::now());
        }
      }
    }
    tracing::debug!("urgency monitor stopped");
  }
}
