//! Configuration management for the proc-graceful coordinator.
//!
//! Settings are layered with figment: built-in defaults first, then an
//! optional configuration file, then `GRACEFUL_`-prefixed environment
//! variables (nested keys separated by `__`).

use figment::providers::{Env, Serialized};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::shutdown;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GRACEFUL_";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level logging (most verbose)
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging (default)
    #[default]
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Logging level
    pub level: LogLevel,
    /// Enable JSON formatted logs (requires the `json-logs` feature)
    pub json: bool,
    /// Enable colored output (ignored for JSON logs)
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            color: true,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Deadline for the shutdown operation in milliseconds
    pub timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: shutdown::default_timeout_ms(),
        }
    }
}

/// Signal handling mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalHandling {
    /// Enabled - treat this signal as a termination trigger
    #[default]
    Enabled,
    /// Disabled - do not listen for this signal
    Disabled,
}

impl From<bool> for SignalHandling {
    fn from(value: bool) -> Self {
        if value {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl From<SignalHandling> for bool {
    fn from(value: SignalHandling) -> Self {
        match value {
            SignalHandling::Enabled => true,
            SignalHandling::Disabled => false,
        }
    }
}

/// Which OS signals count as termination triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// SIGINT (Ctrl+C)
    pub interrupt: SignalHandling,
    /// SIGTERM (console shutdown on Windows)
    pub terminate: SignalHandling,
}

impl SignalConfig {
    /// Create a new signal configuration with both signals enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that listens for no OS signal at all.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            interrupt: SignalHandling::Disabled,
            terminate: SignalHandling::Disabled,
        }
    }

    /// Disable SIGINT handling.
    #[must_use]
    pub const fn without_sigint(mut self) -> Self {
        self.interrupt = SignalHandling::Disabled;
        self
    }

    /// Disable SIGTERM handling.
    #[must_use]
    pub const fn without_sigterm(mut self) -> Self {
        self.terminate = SignalHandling::Disabled;
        self
    }

    /// Whether any OS signal is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        bool::from(self.interrupt) || bool::from(self.terminate)
    }
}

/// Main coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name, used as a tracing field
    pub name: String,
    /// Logging configuration
    pub logging: LogConfig,
    /// Shutdown configuration
    pub shutdown: ShutdownConfig,
    /// Signal configuration
    pub signals: SignalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::from("proc-graceful"),
            logging: LogConfig::default(),
            shutdown: ShutdownConfig::default(),
            signals: SignalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, `graceful.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Will return an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from_file(crate::DEFAULT_CONFIG_FILE)
    }

    /// Load config from a file, layered between defaults and the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Will return an error if the file cannot be read or contains invalid configuration data.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        #[allow(unused_mut)]
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if path.exists() {
            #[cfg(feature = "toml")]
            {
                use figment::providers::Format;
                figment = figment.merge(figment::providers::Toml::file(path));
            }

            #[cfg(not(feature = "toml"))]
            {
                return Err(Error::config(format!(
                    "Configuration file {} found but the `toml` feature is disabled",
                    path.display()
                )));
            }
        }

        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config using a configuration provider, merged over the environment.
    ///
    /// # Errors
    ///
    /// Will return an error if the provider fails to load a valid configuration.
    pub fn load_with_provider<P: Provider>(provider: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(provider)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the shutdown deadline as a Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.timeout_ms == 0 {
            return Err(Error::config("Shutdown timeout must be greater than 0"));
        }

        if self.name.is_empty() {
            return Err(Error::config("Service name cannot be empty"));
        }

        #[cfg(not(feature = "json-logs"))]
        if self.logging.json {
            return Err(Error::config(
                "JSON logging requested but feature not enabled",
            ));
        }

        Ok(())
    }

    /// Create a builder for this configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the service name.
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set the shutdown deadline.
    ///
    /// # Errors
    ///
    /// Will return an error if the duration exceeds `u64::MAX` milliseconds
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.config.shutdown.timeout_ms = u64::try_from(timeout.as_millis())
            .map_err(|_| Error::config("Shutdown timeout too large"))?;
        Ok(self)
    }

    /// Set which OS signals trigger shutdown.
    #[must_use]
    pub const fn signals(mut self, signals: SignalConfig) -> Self {
        self.config.signals = signals;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if the resulting configuration fails validation.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.name, "proc-graceful");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.logging.color);
        assert_eq!(config.signals.interrupt, SignalHandling::Enabled);
        assert_eq!(config.signals.terminate, SignalHandling::Enabled);
        assert!(config.shutdown.timeout_ms > 0);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .name("api-server")
            .log_level(LogLevel::Debug)
            .shutdown_timeout(Duration::from_secs(10))
            .unwrap()
            .signals(SignalConfig::new().without_sigint())
            .build()
            .unwrap();

        assert_eq!(config.name, "api-server");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.shutdown.timeout_ms, 10_000);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.signals.interrupt, SignalHandling::Disabled);
        assert_eq!(config.signals.terminate, SignalHandling::Enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.shutdown.timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        config.shutdown.timeout_ms = 5000;
        config.name = String::new();
        assert!(config.validate().is_err());

        config.name = "svc".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_signal_config() {
        let config = SignalConfig::new().without_sigterm();
        assert_eq!(config.terminate, SignalHandling::Disabled);
        assert!(config.any_enabled());
        assert!(!SignalConfig::disabled().any_enabled());
        assert!(bool::from(SignalHandling::from(true)));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_load_from_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "graceful.toml",
                r#"
                name = "from-file"

                [shutdown]
                timeout_ms = 2500

                [signals]
                interrupt = "disabled"
            "#,
            )?;

            let config = Config::load_from_file("graceful.toml").unwrap();
            assert_eq!(config.name, "from-file");
            assert_eq!(config.shutdown.timeout_ms, 2500);
            assert_eq!(config.signals.interrupt, SignalHandling::Disabled);
            assert_eq!(config.signals.terminate, SignalHandling::Enabled);

            jail.set_env("GRACEFUL_SHUTDOWN__TIMEOUT_MS", "750");
            let config = Config::load_from_file("graceful.toml").unwrap();
            assert_eq!(config.shutdown.timeout_ms, 750);
            Ok(())
        });
    }

    #[test]
    fn test_provider_overrides_env() {
        #[derive(Serialize)]
        struct Override {
            shutdown: ShutdownConfig,
        }

        Jail::expect_with(|jail| {
            jail.set_env("GRACEFUL_NAME", "from-env");
            jail.set_env("GRACEFUL_SHUTDOWN__TIMEOUT_MS", "750");

            let config = Config::load_with_provider(Serialized::defaults(Override {
                shutdown: ShutdownConfig { timeout_ms: 1200 },
            }))
            .unwrap();
            assert_eq!(config.name, "from-env");
            assert_eq!(config.shutdown.timeout_ms, 1200);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load_from_file("does-not-exist.toml").unwrap();
            assert_eq!(config.name, "proc-graceful");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_env_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("GRACEFUL_SHUTDOWN__TIMEOUT_MS", "0");
            let err = Config::load().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
            Ok(())
        });
    }
}
