//! JSON REST API for HelpNet.
//!
//! Exposes an axum [`Router`] over the social-import pipeline and the
//! matching engine. Auth, TLS, and transport concerns are the caller's
//! responsibility; user ids arrive in the path.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", helpnet_api::api_router(state))
//! ```

pub mod error;
pub mod help;
pub mod social;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use helpnet_core::{
  collab::{Classifier, Notifier},
  store::{ConsentStore, GeoIndex, HelpRequestStore, MetricsStore, TokenStore},
};
use helpnet_match::{GeoMatcher, HelpDesk, UrgencyState};
use helpnet_social::{SocialImporter, connector::Connector};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// The concrete collaborators an application is wired with.
pub trait Stack: Send + Sync + 'static {
  type Store: ConsentStore + TokenStore + MetricsStore + HelpRequestStore + GeoIndex + 'static;
  type Connector: Connector + 'static;
  type Classifier: Classifier + 'static;
  type Notifier: Notifier + 'static;
}

/// Shared state threaded through all handlers.
pub struct AppState<T: Stack> {
  pub store:    Arc<T::Store>,
  pub importer: Arc<SocialImporter<T::Store, T::Connector>>,
  pub matcher:  GeoMatcher<T::Store>,
  pub desk:     HelpDesk<T::Store, T::Classifier, T::Notifier>,
  pub urgency:  watch::Receiver<UrgencyState>,
}

impl<T: Stack> Clone for AppState<T> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      importer: Arc::clone(&self.importer),
      matcher:  self.matcher.clone(),
      desk:     self.desk.clone(),
      urgency:  self.urgency.clone(),
    }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<T: Stack>(state: AppState<T>) -> Router<()> {
  Router::new()
    // Providers and consent
    .route("/providers", get(social::providers::<T>))
    .route(
      "/users/{user_id}/consents/{provider}",
      get(social::consent_status::<T>)
        .put(social::grant_consent::<T>)
        .delete(social::revoke_consent::<T>),
    )
    // Connections and imports
    .route(
      "/users/{user_id}/connections/{provider}",
      post(social::connect::<T>).delete(social::disconnect::<T>),
    )
    .route("/connect/callback", get(social::callback::<T>))
    .route("/users/{user_id}/imports/{provider}", post(social::import::<T>))
    // Invitations
    .route("/users/{user_id}/invite-allowance", get(social::allowance::<T>))
    .route("/invites", post(social::send_invite::<T>))
    .route("/invites/batch", post(social::send_batch::<T>))
    .route("/invites/{token}", get(social::verify_invite::<T>))
    // Help requests and matching
    .route("/requests", post(help::submit::<T>))
    .route("/requests/{id}", get(help::get_one::<T>))
    .route("/requests/{id}/status", post(help::transition::<T>))
    .route("/requests/{id}/matches", get(help::request_matches::<T>))
    .route("/matches", get(help::matches::<T>))
    .route("/helpers/{id}", put(help::upsert_helper::<T>))
    .route("/urgency", get(help::urgency::<T>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
