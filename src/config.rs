use config::{Config, ConfigError, File};
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::time;

use crate::domain::retention_policy::RetentionPolicy;

#[derive(Debug)]
pub enum Environment {
    Development,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    // The janitor still starts without it; every job run is then skipped.
    pub subscriber_api: Option<SubscriberApiSettings>,
    pub retention: RetentionSettings,
    pub schedule: ScheduleSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    // secrecy protects secret information and prevents them to be exposed (eg: via logs)
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub name: String,
    pub require_ssl: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct RedisSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub counters_key: String,
    pub triggers_prefix: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct SubscriberApiSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct RetentionSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub soft_status_grace_hours: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub terminal_status_grace_minutes: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub purge_after_minutes: u32,
}

#[derive(serde::Deserialize, Clone)]
pub struct ScheduleSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub first_run_offset_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub stagger_seconds: u64,
}

impl Settings {
    pub fn get_redis_address(&self) -> String {
        self.redis.get_address()
    }

    pub fn get_retention_policy(&self) -> RetentionPolicy {
        self.retention.get_policy()
    }
}

impl DatabaseSettings {
    pub fn get_db_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut db_options = PgConnectOptions::new()
            .host(&self.host)
            .password(self.password.expose_secret())
            .username(&self.username)
            .port(self.port)
            .database(&self.name)
            .ssl_mode(ssl_mode);

        db_options.log_statements(tracing::log::LevelFilter::Trace);

        db_options
    }

    pub fn set_name(&mut self, new_db_name: String) {
        self.name = new_db_name
    }
}

impl RedisSettings {
    pub fn get_address(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

impl SubscriberApiSettings {
    pub fn get_timeout(&self) -> time::Duration {
        time::Duration::from_millis(self.timeout_milliseconds)
    }
}

impl RetentionSettings {
    pub fn get_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            soft_status_grace: chrono::Duration::hours(self.soft_status_grace_hours.into()),
            terminal_status_grace: chrono::Duration::minutes(
                self.terminal_status_grace_minutes.into(),
            ),
            purge_after: chrono::Duration::minutes(self.purge_after_minutes.into()),
        }
    }
}

impl ScheduleSettings {
    pub fn get_interval(&self) -> time::Duration {
        time::Duration::from_secs(self.interval_seconds)
    }

    /// Offset of the `position`-th job in install order.
    pub fn get_first_run_offset(&self, position: usize) -> time::Duration {
        let offset = self.first_run_offset_seconds + self.stagger_seconds * position as u64;

        time::Duration::from_secs(offset)
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            unknown_env => Err(format!(
                "{} is not supported environment. Use either 'development' or 'production'.",
                unknown_env
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let root_path = std::env::current_dir().map_err(|err| {
        ConfigError::Message(format!("Failed to determine the current directory: {}", err))
    })?;
    let config_directory = root_path.join("config");
    // Uses development environment by default
    let enviroment = Environment::try_from(
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into()),
    )
    .map_err(ConfigError::Message)?;
    let config_base_filepath = config_directory.join("base");
    let config_env_filepath = config_directory.join(enviroment.as_str());

    // It merges the base configuration file with the one from the specific environment (development or production)
    let settings = Config::builder()
        .add_source(File::from(config_base_filepath).required(true))
        .add_source(File::from(config_env_filepath).required(true))
        // Merge settings from environment variables with a prefix of APP and "__" separator
        // E.g APP_RETENTION__PURGE_AFTER_MINUTES would set Settings.retention.purge_after_minutes
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    tracing::info!("Application environment = {:?}", enviroment);

    // Try to convert the value from the configuration file into a Settings type
    settings.try_deserialize()
}
