//! Wiring for the HelpNet server binary.
//!
//! Turns a [`ServerConfig`] and an open store into the API state plus the
//! background urgency monitor.

pub mod alerts;
pub mod config;

pub use config::ServerConfig;

use std::sync::Arc;

use anyhow::Context as _;
use helpnet_api::{AppState, Stack};
use helpnet_match::{
  GeoMatcher, HelpDesk, UrgencyMonitor, UrgencyState, classify::KeywordClassifier,
};
use helpnet_social::{
  SocialImporter, connector::HttpConnector, registry::ProviderRegistry, vault::SecureTokenStore,
};
use helpnet_store_sqlite::SqliteStore;
use tokio::sync::watch;

use alerts::HelperAlerts;

/// The production collaborators.
pub struct Live;

impl Stack for Live {
  type Classifier = KeywordClassifier;
  type Connector = HttpConnector;
  type Notifier = HelperAlerts;
  type Store = SqliteStore;
}

pub struct Assembled {
  pub state:   AppState<Live>,
  /// `None` when no urgency center is configured.
  pub monitor: Option<UrgencyMonitor<SqliteStore>>,
}

pub fn assemble(cfg: &ServerConfig, store: SqliteStore) -> anyhow::Result<Assembled> {
  let store = Arc::new(store);

  let mut registry = ProviderRegistry::with_defaults();
  for provider in &cfg.providers {
    registry.register(provider.id.clone(), provider.clone());
  }
  tracing::info!(providers = registry.len(), "provider registry loaded");

  let vault = SecureTokenStore::new(Arc::clone(&store), &cfg.token_secret, cfg.token_salt.as_bytes())
    .context("failed to derive token keys")?;

  let client = reqwest::Client::builder()
    .user_agent(concat!("helpnet/", env!("CARGO_PKG_VERSION")))
    .build()
    .context("failed to build HTTP client")?;

  let importer = SocialImporter::new(
    Arc::new(registry),
    Arc::clone(&store),
    vault,
    HttpConnector::new(client.clone()),
    cfg.import_settings(),
  );

  let alerts = match &cfg.notifier_webhook {
    Some(url) => HelperAlerts::Webhook { client, url: url.clone() },
    None => HelperAlerts::LogOnly,
  };
  let desk = HelpDesk::new(
    Arc::clone(&store),
    Arc::new(KeywordClassifier::default()),
    Arc::new(alerts),
  );

  let (monitor, urgency) = match &cfg.urgency {
    Some(u) => {
      let monitor = UrgencyMonitor::new(Arc::clone(&store), u.settings()?);
      let urgency = monitor.subscribe();
      (Some(monitor), urgency)
    }
    None => {
      tracing::info!("no urgency center configured; urgency monitor disabled");
      let (_, urgency) = watch::channel(UrgencyState::Quiet);
      (None, urgency)
    }
  };

  let state = AppState {
    matcher: GeoMatcher::new(Arc::clone(&store)),
    importer: Arc::new(importer),
    store,
    desk,
    urgency,
  };
  Ok(Assembled { state, monitor })
}
