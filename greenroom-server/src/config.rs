use std::env;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use greenroom_core::{
    AssessmentApiConfig, AuthConfig, GreenroomConfig, LiveSessionApiConfig, DEFAULT_ROOM_TTL,
};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Environment variable {0} is invalid")]
    Invalid(&'static str),
}

/// Everything the server reads from the environment at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub assessment: AssessmentApiConfig,
    pub live_session: LiveSessionApiConfig,
    pub room_ttl: StdDuration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut auth = AuthConfig::new(
            required("JWT_ACCESS_SECRET")?,
            required("JWT_REFRESH_SECRET")?,
        );

        if let Some(minutes) = optional_number("JWT_ACCESS_EXPIRATION_MINUTES")? {
            auth.access_ttl = Duration::minutes(minutes);
        }

        if let Some(days) = optional_number("JWT_REFRESH_EXPIRATION_DAYS")? {
            auth.refresh_ttl = Duration::days(days);
        }

        let room_ttl = optional_number("ROOM_TTL_MS")?
            .map(|ms| StdDuration::from_millis(ms as u64))
            .unwrap_or(DEFAULT_ROOM_TTL);

        let port = optional_number("GREENROOM_SERVER_PORT")?
            .map(|p| u16::try_from(p).map_err(|_| ConfigError::Invalid("GREENROOM_SERVER_PORT")))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            port,
            database_url: required("DATABASE_URL")?,
            auth,
            assessment: AssessmentApiConfig {
                base_url: required("ASSESSMENT_API_URL")?,
                api_key: required("ASSESSMENT_API_KEY")?,
            },
            live_session: LiveSessionApiConfig {
                base_url: required("LIVE_SESSION_URL")?,
                api_key: required("LIVE_SESSION_API_KEY")?,
            },
            room_ttl,
        })
    }

    pub fn greenroom(&self) -> GreenroomConfig {
        GreenroomConfig {
            auth: self.auth.clone(),
            room_ttl: self.room_ttl,
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_number(name: &'static str) -> Result<Option<i64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}
