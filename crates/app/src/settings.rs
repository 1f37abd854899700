//! Handles settings for the application. Configuration is written in
//! `settings.toml`; every key can be overridden through the
//! `GROOTBOEK_` environment prefix (`GROOTBOEK_REST__API_TOKEN=...`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Sqlite {
    pub path: String,
}

/// Modern protocol credentials. Preferred whenever present.
#[derive(Debug, Deserialize)]
pub struct Rest {
    pub api_url: String,
    pub api_token: String,
    pub source: Option<String>,
}

/// Legacy protocol credentials, used when no REST token is configured.
/// The legacy service caps responses at its 500 most recent mutations.
#[derive(Debug, Deserialize)]
pub struct Legacy {
    pub url: String,
    pub username: String,
    pub security_code_1: String,
    pub security_code_2: String,
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub sqlite: Sqlite,
    pub rest: Option<Rest>,
    pub legacy: Option<Legacy>,
    pub app: Option<App>,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("GROOTBOEK").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
