use envconfig::Envconfig;
use once_cell::sync::Lazy;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use crate::cookie::SameSite;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Severity used when a missing record is logged. `None` keeps it silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogLevel(pub Option<tracing::Level>);

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "off" | "none" | "false" => Ok(LogLevel(None)),
            "warning" => Ok(LogLevel(Some(tracing::Level::WARN))),
            other => tracing::Level::from_str(other)
                .map(|level| LogLevel(Some(level)))
                .map_err(|_| format!("Invalid log level: {}", s)),
        }
    }
}

impl Deref for LogLevel {
    type Target = Option<tracing::Level>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "WAFFLE_FLAG_DEFAULT", default = "false")]
    pub flag_default: FlexBool,

    #[envconfig(from = "WAFFLE_SWITCH_DEFAULT", default = "false")]
    pub switch_default: FlexBool,

    #[envconfig(from = "WAFFLE_SAMPLE_DEFAULT", default = "false")]
    pub sample_default: FlexBool,

    #[envconfig(from = "WAFFLE_CREATE_MISSING_FLAGS", default = "false")]
    pub create_missing_flags: FlexBool,

    #[envconfig(from = "WAFFLE_CREATE_MISSING_SWITCHES", default = "false")]
    pub create_missing_switches: FlexBool,

    #[envconfig(from = "WAFFLE_CREATE_MISSING_SAMPLES", default = "false")]
    pub create_missing_samples: FlexBool,

    #[envconfig(from = "WAFFLE_LOG_MISSING_FLAGS", default = "")]
    pub log_missing_flags: LogLevel,

    #[envconfig(from = "WAFFLE_LOG_MISSING_SWITCHES", default = "")]
    pub log_missing_switches: LogLevel,

    #[envconfig(from = "WAFFLE_LOG_MISSING_SAMPLES", default = "")]
    pub log_missing_samples: LogLevel,

    // 30 days
    #[envconfig(from = "WAFFLE_MAX_AGE", default = "2592000")]
    pub max_age_seconds: u64,

    #[envconfig(from = "WAFFLE_OVERRIDE", default = "false")]
    pub override_enabled: FlexBool,

    #[envconfig(from = "WAFFLE_COOKIE", default = "dwf_%s")]
    pub cookie_template: String,

    #[envconfig(from = "WAFFLE_SECURE", default = "true")]
    pub cookie_secure: FlexBool,

    #[envconfig(from = "WAFFLE_SAMESITE", default = "")]
    pub cookie_samesite: SameSite,

    #[envconfig(from = "WAFFLE_CACHE_PREFIX", default = "waffle:")]
    pub cache_prefix: String,

    #[envconfig(from = "WAFFLE_CACHE_TTL_SECONDS", default = "300")]
    pub cache_ttl_seconds: u64,

    #[envconfig(from = "WAFFLE_CACHE_MAX_ENTRIES", default = "100000")]
    pub cache_max_entries: u64,

    // A miss goes to the store on the request path, so keep this tight.
    #[envconfig(from = "WAFFLE_STORE_TIMEOUT_MS", default = "50")]
    pub store_timeout_ms: u64,

    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            flag_default: FlexBool(false),
            switch_default: FlexBool(false),
            sample_default: FlexBool(false),
            create_missing_flags: FlexBool(false),
            create_missing_switches: FlexBool(false),
            create_missing_samples: FlexBool(false),
            log_missing_flags: LogLevel(None),
            log_missing_switches: LogLevel(None),
            log_missing_samples: LogLevel(None),
            max_age_seconds: 2_592_000,
            override_enabled: FlexBool(false),
            cookie_template: "dwf_%s".to_string(),
            cookie_secure: FlexBool(true),
            cookie_samesite: SameSite::Unset,
            cache_prefix: "waffle:".to_string(),
            cache_ttl_seconds: 300,
            cache_max_entries: 100_000,
            store_timeout_ms: 50,
            redis_url: "redis://localhost:6379/".to_string(),
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);
