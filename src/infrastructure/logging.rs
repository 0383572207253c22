use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::{AppConfig, LogFormat};

/// Installs the global subscriber from `config.logging`. `RUST_LOG` wins over
/// the configured level.
///
/// Returns an error when a global subscriber is already set.
pub fn init_logging(config: &AppConfig) -> Result<(), TryInitError> {
    let logging = &config.logging;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
                .try_init()?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init()?;
        }
    }

    tracing::info!(
        level = %logging.level,
        format = ?logging.format,
        backend = %config.cache.backend,
        prefix = %config.cache.prefix,
        "Logging initialized for cache"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use crate::infrastructure::cache::CacheConfig;

    #[test]
    fn test_second_init_fails() {
        let config = AppConfig {
            cache: CacheConfig::redis("127.0.0.1:6379").with_prefix("sessions"),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Json,
            },
        };

        // Whichever call installs first, a later one must be refused
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
