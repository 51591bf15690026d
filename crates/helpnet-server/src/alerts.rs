//! Delivery of "someone nearby needs help" alerts.

use std::future::Future;

use helpnet_core::{collab::Notifier, geo::GeoPoint};

/// Where helper alerts go.
#[derive(Debug, Clone)]
pub enum HelperAlerts {
  /// POST the point as JSON to an external notification service.
  Webhook { client: reqwest::Client, url: String },
  /// Only write the alert to the log.
  LogOnly,
}

impl Notifier for HelperAlerts {
  type Error = reqwest::Error;

  fn notify_nearby(
    &self,
    point: GeoPoint,
  ) -> impl Future<Output = Result<(), reqwest::Error>> + Send + '_ {
    async move {
      match self {
        Self::Webhook { client, url } => {
          client.post(url).json(&point).send().await?.error_for_status()?;
        }
        Self::LogOnly => {
          tracing::info!(lat = point.lat, lon = point.lon, "urgent request; no webhook configured");
        }
      }
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
  };

  use super::*;

  fn webhook(server: &MockServer) -> HelperAlerts {
    HelperAlerts::Webhook {
      client: reqwest::Client::new(),
      url:    format!("{}/alerts", server.uri()),
    }
  }

  #[tokio::test]
  async fn webhook_receives_the_point() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/alerts"))
      .and(body_json(json!({ "lat": 45.76, "lon": 4.84 })))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let point = GeoPoint::new(45.76, 4.84).unwrap();
    webhook(&server).notify_nearby(point).await.unwrap();
  }

  #[tokio::test]
  async fn webhook_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let point = GeoPoint::new(0.0, 0.0).unwrap();
    assert!(webhook(&server).notify_nearby(point).await.is_err());
  }

  #[tokio::test]
  async fn log_only_never_fails() {
    let point = GeoPoint::new(0.0, 0.0).unwrap();
    HelperAlerts::LogOnly.notify_nearby(point).await.unwrap();
  }
}
