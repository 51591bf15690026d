//! End-to-end router tests against an in-memory store and a stub connector.

use std::{convert::Infallible, future::Future, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode},
};
use helpnet_core::{geo::GeoPoint, metrics::UserMetrics, provider::Provider};
use helpnet_match::{
  GeoMatcher, HelpDesk, UrgencyMonitor,
  classify::KeywordClassifier,
  urgency::UrgencySettings,
};
use helpnet_social::{
  SocialImporter,
  connector::{
    AuthOutcome, AuthRequest, Connector, ConnectorError, Delivery, Invitation, RawContact,
    RawPage,
  },
  importer::ImportSettings,
  registry::ProviderRegistry,
  vault::{ProviderToken, SecureTokenStore},
};
use helpnet_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use url::Url;
use uuid::Uuid;

use super::*;

// ─── Wiring ───────────────────────────────────────────────────────────────────

/// Answers every provider the same way: redirect-based methods redirect,
/// the rest hand out a session; every import is one page of three.
struct StubConnector;

impl Connector for StubConnector {
  fn authenticate<'a>(
    &'a self,
    provider: &'a Provider,
    request: AuthRequest<'a>,
  ) -> impl Future<Output = Result<AuthOutcome, ConnectorError>> + Send + 'a {
    async move {
      if provider.method.uses_authorization_redirect() && request.code.is_none() {
        let url = format!("https://auth.example/authorize?state={}", request.state);
        return Ok(AuthOutcome::Redirect { authorize_url: url });
      }
      Ok(AuthOutcome::Token(ProviderToken::new("stub-session")))
    }
  }

  fn fetch_page<'a>(
    &'a self,
    _provider: &'a Provider,
    _token: &'a ProviderToken,
    _cursor: Option<&'a str>,
    _page_size: u32,
  ) -> impl Future<Output = Result<RawPage, ConnectorError>> + Send + 'a {
    async {
      let contacts = (1..=3)
        .filter_map(|i| RawContact::from_json(json!({ "id": i, "name": format!("Friend {i}") })))
        .collect();
      Ok(RawPage { contacts, next_cursor: None })
    }
  }

  fn deliver<'a>(
    &'a self,
    _provider: &'a Provider,
    _token: Option<&'a ProviderToken>,
    _invitation: Invitation<'a>,
  ) -> impl Future<Output = Result<Delivery, ConnectorError>> + Send + 'a {
    async { Ok(Delivery::default()) }
  }
}

struct QuietNotifier;

impl helpnet_core::collab::Notifier for QuietNotifier {
  type Error = Infallible;

  fn notify_nearby(&self, _point: GeoPoint) -> impl Future<Output = Result<(), Infallible>> + Send + '_ {
    async { Ok(()) }
  }
}

struct TestStack;

impl Stack for TestStack {
  type Classifier = KeywordClassifier;
  type Connector = StubConnector;
  type Notifier = QuietNotifier;
  type Store = SqliteStore;
}

struct Harness {
  app:   Router,
  store: Arc<SqliteStore>,
}

async fn harness() -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let vault = SecureTokenStore::new(Arc::clone(&store), "api-tests", b"api-test-salt").unwrap();
  let importer = SocialImporter::new(
    Arc::new(ProviderRegistry::with_defaults()),
    Arc::clone(&store),
    vault,
    StubConnector,
    ImportSettings::default(),
  );
  let monitor = UrgencyMonitor::new(
    Arc::clone(&store),
    UrgencySettings::around(GeoPoint::new(45.76, 4.84).unwrap()),
  );

  let state = AppState::<TestStack> {
    store:    Arc::clone(&store),
    importer: Arc::new(importer),
    matcher:  GeoMatcher::new(Arc::clone(&store)),
    desk:     HelpDesk::new(
      Arc::clone(&store),
      Arc::new(KeywordClassifier::default()),
      Arc::new(QuietNotifier),
    ),
    urgency:  monitor.subscribe(),
  };
  Harness { app: api_router(state), store }
}

impl Harness {
  async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(json) => {
        builder = builder.header("content-type", "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    let resp = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
  }
}

// ─── Providers and consent ────────────────────────────────────────────────────

#[tokio::test]
async fn providers_are_listed_without_credentials() {
  let h = harness().await;
  let (status, body) = h.call("GET", "/providers", None).await;
  assert_eq!(status, StatusCode::OK);
  let ids: Vec<&str> = body.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
  assert_eq!(ids, ["facebook", "linkedin", "mastodon", "telegram", "wechat", "whatsapp"]);
  assert!(!body.to_string().contains("credentials"));
}

#[tokio::test]
async fn connect_without_consent_is_forbidden() {
  let h = harness().await;
  let user = Uuid::new_v4();
  let (status, body) = h
    .call("POST", &format!("/users/{user}/connections/telegram"), Some(json!({})))
    .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], "consent_required");
}

#[tokio::test]
async fn consent_for_an_unknown_provider_is_not_found() {
  let h = harness().await;
  let user = Uuid::new_v4();
  let (status, body) = h.call("PUT", &format!("/users/{user}/consents/myspace"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"], "unknown_provider");
}

#[tokio::test]
async fn consent_connect_import_revoke() {
  let h = harness().await;
  let user = Uuid::new_v4();
  let consent = format!("/users/{user}/consents/telegram");
  let connection = format!("/users/{user}/connections/telegram");
  let imports = format!("/users/{user}/imports/telegram");

  let (status, body) = h.call("PUT", &consent, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["granted"], true);
  assert_eq!(h.call("GET", &consent, None).await.1["granted"], true);

  let (status, body) = h.call("POST", &imports, Some(json!({}))).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"], "token_not_found");

  let (status, body) = h.call("POST", &connection, Some(json!({}))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "connected");

  let (status, body) = h.call("POST", &imports, Some(json!({ "limit": 2 }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["friends"].as_array().unwrap().len(), 2);
  assert!(!body.to_string().contains("stub-session"));

  let (status, body) = h.call("DELETE", &consent, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["revoked"], true);

  let (status, body) = h.call("POST", &connection, Some(json!({}))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], "consent_required");
}

#[tokio::test]
async fn oauth_callback_completes_the_connection() {
  let h = harness().await;
  let user = Uuid::new_v4();
  h.call("PUT", &format!("/users/{user}/consents/facebook"), None).await;

  let (status, body) = h
    .call("POST", &format!("/users/{user}/connections/facebook"), Some(json!({})))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "redirect");
  let authorize_url = Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
  let state = authorize_url
    .query_pairs()
    .find(|(k, _)| k == "state")
    .map(|(_, v)| v.into_owned())
    .unwrap();

  let (status, _) = h.call("GET", "/connect/callback?code=abc&state=forged", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = h
    .call("GET", &format!("/connect/callback?state={state}&error=access_denied"), None)
    .await;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert_eq!(body["error"], "auth_flow_failed");

  let (status, body) = h.call("GET", &format!("/connect/callback?code=abc&state={state}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "connected");
  assert_eq!(body["provider_id"], "facebook");
}

#[tokio::test]
async fn oversized_imports_are_rejected() {
  let h = harness().await;
  let user = Uuid::new_v4();
  let (status, body) = h
    .call("POST", &format!("/users/{user}/imports/telegram"), Some(json!({ "limit": 1_000_000 })))
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "bad_request");
}

// ─── Invitations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn invites_follow_the_anti_spam_gate() {
  let h = harness().await;
  let user = Uuid::new_v4();
  h.call("PUT", &format!("/users/{user}/consents/telegram"), None).await;
  h.call("POST", &format!("/users/{user}/connections/telegram"), Some(json!({}))).await;

  let invite = json!({
    "friend": {
      "external_id": "tg-7",
      "display_name": "Ann",
      "provider": "telegram",
      "owner_id": user,
    },
    "template": "Hi {name}: https://helpnet.example/invite/{token}",
  });

  let (status, body) = h.call("POST", "/invites", Some(invite.clone())).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["error"], "invite_blocked");
  assert!(body["message"].as_str().unwrap().contains("success rate"));

  let metrics = UserMetrics { invite_success_rate: 0.5, spam_reports: 2, karma_score: 500.0 };
  h.store.put_metrics(user, metrics).await.unwrap();

  let (status, body) = h.call("GET", &format!("/users/{user}/invite-allowance"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "allowed": true, "daily_limit": 50 }));

  let (status, body) = h.call("POST", "/invites", Some(invite)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
  let token = body["token"].as_str().unwrap();

  let (status, body) = h.call("GET", &format!("/invites/{token}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["valid"], true);
  assert_eq!(body["friend_id"], "tg-7");
}

#[tokio::test]
async fn invite_batches_stop_at_the_first_block() {
  let h = harness().await;
  let user = Uuid::new_v4();
  h.call("PUT", &format!("/users/{user}/consents/telegram"), None).await;
  h.call("POST", &format!("/users/{user}/connections/telegram"), Some(json!({}))).await;

  let friend = |id: &str| {
    json!({ "external_id": id, "display_name": "Ann", "provider": "telegram", "owner_id": user })
  };
  let two = json!({ "friends": [friend("tg-1"), friend("tg-2")] });

  let (status, body) = h.call("POST", "/invites/batch", Some(two)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["sent"], 0);
  assert_eq!(body["remaining"], 1);
  assert_eq!(body["blocked"], "low_success_rate");
  assert_eq!(body["results"][0]["error"], "invite_blocked");

  let metrics = UserMetrics { invite_success_rate: 0.5, spam_reports: 0, karma_score: 2.0 };
  h.store.put_metrics(user, metrics).await.unwrap();

  let one = json!({ "friends": [friend("tg-3")] });
  let (status, body) = h.call("POST", "/invites/batch", Some(one)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["sent"], 1);
  assert!(body.get("blocked").is_none());
  assert_eq!(body["results"][0]["external_id"], "tg-3");
  assert_eq!(body["results"][0]["receipt"]["success"], true);

  let too_many: Vec<Value> = (0..=crate::social::MAX_INVITE_BATCH)
    .map(|i| friend(&format!("tg-{i}")))
    .collect();
  let (status, _) = h.call("POST", "/invites/batch", Some(json!({ "friends": too_many }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Requests and matching ────────────────────────────────────────────────────

#[tokio::test]
async fn request_lifecycle_over_http() {
  let h = harness().await;
  let (status, body) = h
    .call(
      "POST",
      "/requests",
      Some(json!({
        "requester_id": Uuid::new_v4(),
        "title": "Need groceries for the week",
        "location": { "lat": 45.76, "lon": 4.84 },
      })),
    )
    .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["category"], "food");
  assert_eq!(body["status"], "open");
  let id = body["id"].as_str().unwrap().to_owned();

  let (status, body) = h
    .call("POST", &format!("/requests/{id}/status"), Some(json!({ "status": "resolved" })))
    .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], "invalid_transition");

  let (status, body) = h
    .call("POST", &format!("/requests/{id}/status"), Some(json!({ "status": "in_progress" })))
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "in_progress");

  let (status, body) = h.call("GET", &format!("/requests/{}", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn invalid_requests_are_bad_input() {
  let h = harness().await;
  let (status, body) = h
    .call(
      "POST",
      "/requests",
      Some(json!({
        "requester_id": Uuid::new_v4(),
        "title": "Help",
        "category": "food",
        "urgency": 42,
        "location": { "lat": 45.76, "lon": 4.84 },
      })),
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn helpers_are_matched_to_requests() {
  let h = harness().await;
  let near = Uuid::new_v4();
  let far = Uuid::new_v4();
  for (id, lat) in [(near, 45.77), (far, 46.5)] {
    let (status, _) = h
      .call(
        "PUT",
        &format!("/helpers/{id}"),
        Some(json!({
          "location": { "lat": lat, "lon": 4.84 },
          "skills": ["food"],
          "karma_score": 200.0,
          "availability_score": 0.8,
        })),
      )
      .await;
    assert_eq!(status, StatusCode::OK);
  }

  let (_, body) = h
    .call(
      "POST",
      "/requests",
      Some(json!({
        "requester_id": Uuid::new_v4(),
        "title": "Soup kitchen",
        "category": "food",
        "location": { "lat": 45.76, "lon": 4.84 },
      })),
    )
    .await;
  let id = body["id"].as_str().unwrap().to_owned();

  let (status, body) = h.call("GET", &format!("/requests/{id}/matches"), None).await;
  assert_eq!(status, StatusCode::OK);
  let ranked = body.as_array().unwrap();
  assert_eq!(ranked.len(), 1);
  assert_eq!(ranked[0]["id"], near.to_string());
  let score = ranked[0]["match_score"].as_u64().unwrap();
  assert!(score > 80 && score <= 100, "score {score}");

  let (status, body) = h
    .call("GET", "/matches?lat=45.76&lon=4.84&category=food&max_km=100", None)
    .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 2);

  let (status, _) = h
    .call(
      "PUT",
      &format!("/helpers/{near}"),
      Some(json!({ "location": { "lat": 45.77, "lon": 4.84 }, "availability_score": 3.0 })),
    )
    .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn urgency_starts_quiet() {
  let h = harness().await;
  let (status, body) = h.call("GET", "/urgency", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "state": "quiet" }));
}
