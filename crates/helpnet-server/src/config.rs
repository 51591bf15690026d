//! Server configuration, read from `config.toml` and `HELPNET_*` variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use config::{Config, ConfigBuilder, builder::DefaultState};
use helpnet_core::{geo::GeoPoint, metrics::AntiSpamPolicy, provider::Provider};
use helpnet_match::urgency::UrgencySettings;
use helpnet_social::importer::ImportSettings;
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORE_PATH: &str = "helpnet.db";

/// Runtime server configuration.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  /// Master secret for provider-token encryption and signed tokens.
  pub token_secret:     String,
  /// At least 8 bytes; changing it makes stored tokens unreadable.
  pub token_salt:       String,
  /// Externally visible base URL, used to build the OAuth callback.
  #[serde(default)]
  pub public_url:       Option<String>,
  #[serde(default)]
  pub invite_ttl_days:  Option<i64>,
  /// Receives `{"lat","lon"}` for every urgent request. Alerts are only
  /// logged when unset.
  #[serde(default)]
  pub notifier_webhook: Option<String>,
  #[serde(default)]
  pub importer:         ImporterConfig,
  /// Enables the urgency monitor around the given center.
  #[serde(default)]
  pub urgency:          Option<UrgencyConfig>,
  /// Added to, or replacing, the built-in provider catalogue.
  #[serde(default)]
  pub providers:        Vec<Provider>,
}

/// Overrides of the import pipeline's tuning.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct ImporterConfig {
  pub page_delay_ms:          Option<u64>,
  pub max_attempts:           Option<u32>,
  pub backoff_base_ms:        Option<u64>,
  pub call_timeout_ms:        Option<u64>,
  pub rate_limit_max_wait_ms: Option<u64>,
  /// Pause between two invitations of a batch.
  pub invite_delay_ms:        Option<u64>,
  pub antispam:               Option<AntiSpamPolicy>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct UrgencyConfig {
  pub lat:            f64,
  pub lon:            f64,
  pub radius_km:      Option<f64>,
  pub threshold:      Option<u32>,
  pub min_urgency:    Option<u8>,
  pub poll_secs:      Option<u64>,
  pub countdown_secs: Option<u64>,
}

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Read `path` if it exists, then overlay `HELPNET_*` environment variables
/// (`HELPNET_IMPORTER__MAX_ATTEMPTS` for nested keys).
pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
  let builder = defaults()?
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("HELPNET")
        .prefix_separator("_")
        .separator("__"),
    );
  finish(builder)
}

fn defaults() -> anyhow::Result<ConfigBuilder<DefaultState>> {
  Ok(
    Config::builder()
      .set_default("host", DEFAULT_HOST)?
      .set_default("port", i64::from(DEFAULT_PORT))?
      .set_default("store_path", DEFAULT_STORE_PATH)?,
  )
}

fn finish(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ServerConfig> {
  let cfg: ServerConfig = builder
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if cfg.token_secret.trim().is_empty() {
    anyhow::bail!("token_secret must not be empty");
  }
  Ok(cfg)
}

// ─── Derived settings ─────────────────────────────────────────────────────────

impl ServerConfig {
  /// Where providers send users back after authorizing; the API is mounted
  /// under `/api`.
  pub fn redirect_uri(&self) -> String {
    let base = match &self.public_url {
      Some(url) => url.trim_end_matches('/').to_owned(),
      None => format!("http://{}:{}", self.host, self.port),
    };
    format!("{base}/api/connect/callback")
  }

  pub fn import_settings(&self) -> ImportSettings {
    let mut settings = ImportSettings { redirect_uri: self.redirect_uri(), ..Default::default() };
    let c = &self.importer;
    if let Some(ms) = c.page_delay_ms {
      settings.page_delay = Duration::from_millis(ms);
    }
    if let Some(n) = c.max_attempts {
      settings.max_attempts = n.max(1);
    }
    if let Some(ms) = c.backoff_base_ms {
      settings.backoff_base = Duration::from_millis(ms);
    }
    if let Some(ms) = c.call_timeout_ms {
      settings.call_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = c.rate_limit_max_wait_ms {
      settings.rate_limit_max_wait = Duration::from_millis(ms);
    }
    if let Some(ms) = c.invite_delay_ms {
      settings.invite_delay = Duration::from_millis(ms);
    }
    if let Some(days) = self.invite_ttl_days {
      settings.invite_ttl = chrono::Duration::days(days);
    }
    if let Some(policy) = c.antispam {
      settings.antispam = policy;
    }
    settings
  }
}

impl UrgencyConfig {
  pub fn settings(&self) -> anyhow::Result<UrgencySettings> {
    let center = GeoPoint::new(self.lat, self.lon).context("invalid urgency center")?;
    let mut settings = UrgencySettings::around(center);
    if let Some(km) = self.radius_km {
      settings.radius_km = km;
    }
    if let Some(n) = self.threshold {
      settings.threshold = n.max(1);
    }
    if let Some(u) = self.min_urgency {
      settings.min_urgency = u;
    }
    if let Some(secs) = self.poll_secs {
      settings.poll_interval = Duration::from_secs(secs.max(1));
    }
    if let Some(secs) = self.countdown_secs {
      settings.countdown = Duration::from_secs(secs);
    }
    Ok(settings)
  }
}
