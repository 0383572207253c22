use serde::Deserialize;

use crate::infrastructure::cache::CacheConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Loads `config/default` and `config/local` (both optional), then
    /// `CACHE__*` environment overrides such as `CACHE__CACHE__BACKEND=redis`.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder(config::Environment::with_prefix("CACHE"))?.try_deserialize()
    }

    fn builder(
        env: config::Environment,
    ) -> Result<config::Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(env.separator("__").try_parsing(true))
            .build()
    }
}
