use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

use crate::pg::ServerAddress;
use crate::schedule::SchedulePlan;

pub const DEFAULT_LISTING_URL: &str = "https://geokeo.com/database/city/de";
pub const DEFAULT_WEATHER_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Which relational store `extract` and `stats` talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationalBackend {
    /// Networked server reached with the `sql_*` settings.
    #[default]
    Postgres,
    /// Local file at `sqlite_path`.
    Sqlite,
}

/// Process configuration, read from `WEATHER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// OpenWeather `appid`. Only `ingest` needs it.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    #[serde(default = "default_weather_endpoint")]
    pub weather_endpoint: String,
    #[serde(default = "default_city_limit")]
    pub city_limit: usize,
    /// 0 = unlimited.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
    #[serde(default = "default_mongo_uri")]
    pub mongo_uri: String,
    #[serde(default = "default_mongo_database")]
    pub mongo_database: String,
    #[serde(default = "default_mongo_collection")]
    pub mongo_collection: String,
    #[serde(default)]
    pub relational: RelationalBackend,
    #[serde(default = "default_sql_user")]
    pub sql_user: String,
    #[serde(default = "default_sql_password")]
    pub sql_password: String,
    #[serde(default = "default_sql_host")]
    pub sql_host: String,
    #[serde(default = "default_sql_port")]
    pub sql_port: u16,
    #[serde(default = "default_sql_database")]
    pub sql_database: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}

fn default_weather_endpoint() -> String {
    DEFAULT_WEATHER_ENDPOINT.to_string()
}

fn default_city_limit() -> usize {
    10
}

fn default_max_iterations() -> u32 {
    5
}

fn default_sleep_secs() -> u64 {
    60 * 30
}

fn default_mongo_uri() -> String {
    "mongodb://mongodb:27017/".to_string()
}

fn default_mongo_database() -> String {
    "data_db".to_string()
}

fn default_mongo_collection() -> String {
    "data_collection".to_string()
}

fn default_sql_user() -> String {
    "root".to_string()
}

fn default_sql_password() -> String {
    "password".to_string()
}

fn default_sql_host() -> String {
    "postgres".to_string()
}

fn default_sql_port() -> u16 {
    5432
}

fn default_sql_database() -> String {
    "data_db".to_string()
}

fn default_sqlite_path() -> String {
    "data/weather.sqlite".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_key: None,
            listing_url: default_listing_url(),
            weather_endpoint: default_weather_endpoint(),
            city_limit: default_city_limit(),
            max_iterations: default_max_iterations(),
            sleep_secs: default_sleep_secs(),
            mongo_uri: default_mongo_uri(),
            mongo_database: default_mongo_database(),
            mongo_collection: default_mongo_collection(),
            relational: RelationalBackend::default(),
            sql_user: default_sql_user(),
            sql_password: default_sql_password(),
            sql_host: default_sql_host(),
            sql_port: default_sql_port(),
            sql_database: default_sql_database(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Settings> {
        Config::builder()
            .add_source(config::Environment::with_prefix("WEATHER").try_parsing(true))
            .build()
            .context("Failed to read WEATHER_* environment")?
            .try_deserialize()
            .context("Invalid WEATHER_* configuration")
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .context("WEATHER_API_KEY environment variable must be set")
    }

    pub fn server_address(&self) -> ServerAddress {
        ServerAddress {
            user: self.sql_user.clone(),
            password: self.sql_password.clone(),
            host: self.sql_host.clone(),
            port: self.sql_port,
            database: self.sql_database.clone(),
        }
    }

    pub fn schedule_plan(&self) -> SchedulePlan {
        SchedulePlan {
            max_iterations: self.max_iterations,
            sleep: Duration::from_secs(self.sleep_secs),
        }
    }
}
