//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default power level that counts as "admin".
fn default_admin_power_level() -> i64 {
    100
}

/// Default confirmation glyph.
fn default_confirmation_emoji() -> String {
    "\u{2B55}".to_string()
}

/// Default key of the post collection in the memory store.
fn default_memory_key() -> String {
    "twim".to_string()
}

/// Default database endpoint (in-process, in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "twim".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "bot".to_string()
}

/// Default long-poll timeout for the sync loop.
fn default_sync_timeout_ms() -> u64 {
    30_000
}

/// Configuration for the twim-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    /// The shared settings.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

/// The settings themselves; see [`Config`].
#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Homeserver base URL (`MATRIX_HOMESERVER`).
    pub matrix_homeserver: String,
    /// Access token of the bot account (`MATRIX_ACCESS_TOKEN`).
    pub matrix_access_token: String,
    /// Room id or alias of the "main" room, where commands are admin-gated (`MAIN_ROOM`).
    #[serde(default)]
    pub main_room: Option<String>,
    /// Room id or alias of the room that accepted posts are mirrored into (`ECHO_ROOM`).
    #[serde(default)]
    pub echo_room: Option<String>,
    /// Power level a user needs to run admin commands (`ADMIN_POWER_LEVEL`).
    #[serde(default = "default_admin_power_level")]
    pub admin_power_level: i64,
    /// Reaction glyph used to confirm posts (`CONFIRMATION_EMOJI`).
    #[serde(default = "default_confirmation_emoji")]
    pub confirmation_emoji: String,
    /// Key of the post collection in the memory store (`MEMORY_KEY`).
    #[serde(default = "default_memory_key")]
    pub memory_key: String,
    /// Database endpoint URL, e.g. `mem://` or `ws://localhost:8000` (`DB_ENDPOINT`).
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: Option<String>,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: Option<String>,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Long-poll timeout for `/sync`, in milliseconds (`SYNC_TIMEOUT_MS`).
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            matrix_homeserver: String::new(),
            matrix_access_token: String::new(),
            main_room: None,
            echo_room: None,
            admin_power_level: default_admin_power_level(),
            confirmation_emoji: default_confirmation_emoji(),
            memory_key: default_memory_key(),
            db_endpoint: default_db_endpoint(),
            db_username: None,
            db_password: None,
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl Config {
    /// Load the configuration from the environment and a TOML file, then validate it.
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(config::Environment::default().prefix("TWIM_BOT"));

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if !self.matrix_homeserver.starts_with("http://") && !self.matrix_homeserver.starts_with("https://") {
            return Err(anyhow::anyhow!("Matrix homeserver must be an http(s) URL."));
        }

        if self.matrix_access_token.trim().is_empty() {
            return Err(anyhow::anyhow!("Matrix access token must not be empty."));
        }

        if self.admin_power_level < 1 {
            return Err(anyhow::anyhow!("Admin power level must be positive."));
        }

        if self.confirmation_emoji.is_empty() {
            return Err(anyhow::anyhow!("Confirmation emoji must not be empty."));
        }

        if self.sync_timeout_ms < 1 || self.sync_timeout_ms > 120_000 {
            return Err(anyhow::anyhow!("Sync timeout must be between 1 and 120000 milliseconds."));
        }

        Ok(())
    }
}
