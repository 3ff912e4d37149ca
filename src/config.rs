use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub app_base_url: String,
    pub email_from: String,
    /// No webhook means emails are only logged and recorded in the outbox.
    pub email_webhook_url: Option<String>,
    /// Inbox that receives a notice whenever a client submits a check-in.
    pub coach_notify_email: Option<String>,
    pub reminder_lookahead_hours: i64,
    pub overdue_grace_hours: i64,
    pub submit_rate_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source so tests don't touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| {
            let port = get("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 10)?,
            app_base_url: get("APP_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            email_from: get("EMAIL_FROM").unwrap_or_else(|| "checkins@localhost".to_string()),
            email_webhook_url: get("EMAIL_WEBHOOK_URL"),
            coach_notify_email: get("COACH_NOTIFY_EMAIL"),
            reminder_lookahead_hours: parse_or(&get, "REMINDER_LOOKAHEAD_HOURS", 24)?,
            overdue_grace_hours: parse_or(&get, "OVERDUE_GRACE_HOURS", 0)?,
            submit_rate_limit: parse_or(&get, "SUBMIT_RATE_LIMIT", 10)?,
        })
    }

    pub fn overdue_grace(&self) -> Duration {
        Duration::hours(self.overdue_grace_hours.max(0))
    }

    pub fn reminder_lookahead(&self) -> Duration {
        Duration::hours(self.reminder_lookahead_hours.max(1))
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
