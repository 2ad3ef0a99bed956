//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults

use serde::Deserialize;

/// Load the application configuration.
///
/// `file` names an optional config file (without extension); `config` is used when absent.
pub fn init(file: Option<&str>) -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "sqlite://circles.db")?
        .set_default("database.max_connections", 10)?
        .set_default("database.min_connections", 1)?
        .set_default("sessions.cookie_name", "session_id")?
        .set_default("sessions.ttl_secs", 2_592_000)? // 30 days
        // Optional config file
        .add_source(config::File::with_name(file.unwrap_or("config")).required(file.is_some()))
        // Environment variables (CIRCLES__SERVER__HOST, CIRCLES__DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("CIRCLES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://circles.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Name of the cookie carrying the opaque session id
    pub cookie_name: String,
    /// Server-side session lifetime in seconds
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvisioningConfig {
    /// Path of the declarative circle file applied at startup, if any.
    pub circles_init: Option<String>,
}
