//! Client configuration for talking to a Marketplace repository.
//!
//! Values come from three layers, later layers winning:
//! built-in defaults, an optional TOML file, and environment variables.
//!
//! # Examples
//!
//! ```
//! use marketplace_core::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::default();
//! assert_eq!(config.max_parallel_connections, 16);
//!
//! let custom = ClientConfig::builder()
//!     .host("https://plugins.example.org")
//!     .read_timeout(Duration::from_secs(30))
//!     .build();
//! assert!(custom.validate().is_ok());
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`ClientConfig::max_parallel_connections`].
pub const MAX_PARALLEL_CONNECTIONS_ENV: &str = "MARKETPLACE_MAX_PARALLEL_CONNECTIONS";

const DEFAULT_HOST: &str = "https://plugins.jetbrains.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_PARALLEL_CONNECTIONS: usize = 16;
const DEFAULT_MAX_DOWNLOAD_FRACTION: f64 = 0.65;

/// Runtime configuration of the repository client.
///
/// # Examples
///
/// ```
/// use marketplace_core::ClientConfig;
///
/// let config = ClientConfig {
///     max_download_fraction: 0.5,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the repository.
    ///
    /// Default: `https://plugins.jetbrains.com`
    pub host: String,

    /// TCP connect timeout.
    ///
    /// Default: 5 minutes
    pub connect_timeout: Duration,

    /// Read timeout for each response.
    ///
    /// Default: 5 minutes
    pub read_timeout: Duration,

    /// Upper bound on concurrent HTTP connections.
    ///
    /// Default: 16
    pub max_parallel_connections: usize,

    /// Largest share of the new artifact that may be fetched through ranges
    /// before the delta path gives up in favor of a full download.
    ///
    /// Default: 0.65
    pub max_download_fraction: f64,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            max_parallel_connections: DEFAULT_MAX_PARALLEL_CONNECTIONS,
            max_download_fraction: DEFAULT_MAX_DOWNLOAD_FRACTION,
            user_agent: format!("marketplace-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// On-disk shape of the configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    max_parallel_connections: Option<usize>,
    max_download_fraction: Option<f64>,
    user_agent: Option<String>,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the default configuration file location,
    /// `<config_dir>/marketplace/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("marketplace").join("config.toml"))
    }

    /// Parses configuration from TOML text, starting from defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text is not valid TOML or
    /// contains unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::ClientConfig;
    ///
    /// let config = ClientConfig::from_toml_str("max_parallel_connections = 4").unwrap();
    /// assert_eq!(config.max_parallel_connections, 4);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text).map_err(|e| Error::ConfigError {
            message: e.to_string(),
        })?;
        Ok(Self::default().merge(file))
    }

    /// Reads configuration from a TOML file, starting from defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read and
    /// [`Error::ConfigParse`] if it is not valid.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(Self::default().merge(file))
    }

    /// Loads the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if a file is present there. Environment overrides are applied
    /// last and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, any file fails to
    /// parse, an environment override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.is_file() => Self::from_toml_file(&default)?,
                _ => Self::default(),
            },
        };

        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides using the given variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if
    /// [`MAX_PARALLEL_CONNECTIONS_ENV`] is set but is not a number.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::{ClientConfig, MAX_PARALLEL_CONNECTIONS_ENV};
    ///
    /// let config = ClientConfig::default()
    ///     .with_env_overrides(|key| {
    ///         (key == MAX_PARALLEL_CONNECTIONS_ENV).then(|| "4".to_string())
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.max_parallel_connections, 4);
    /// ```
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MAX_PARALLEL_CONNECTIONS_ENV) {
            self.max_parallel_connections =
                value.trim().parse().map_err(|_| Error::ConfigError {
                    message: format!(
                        "{MAX_PARALLEL_CONNECTIONS_ENV} must be a positive integer, got '{value}'"
                    ),
                })?;
        }
        Ok(self)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if:
    /// - the host is empty
    /// - a timeout is zero
    /// - the connection limit is zero
    /// - the download fraction is outside `(0, 1]`
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::ClientConfig;
    ///
    /// let mut invalid = ClientConfig::default();
    /// invalid.max_parallel_connections = 0;
    /// assert!(invalid.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("host cannot be empty"));
        }

        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(config_error("timeouts must be greater than zero"));
        }

        if self.max_parallel_connections == 0 {
            return Err(config_error(
                "max_parallel_connections must be greater than zero",
            ));
        }

        if !(self.max_download_fraction > 0.0 && self.max_download_fraction <= 1.0) {
            return Err(config_error("max_download_fraction must be in (0, 1]"));
        }

        Ok(())
    }

    fn merge(mut self, file: FileConfig) -> Self {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.read_timeout_secs {
            self.read_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = file.max_parallel_connections {
            self.max_parallel_connections = limit;
        }
        if let Some(fraction) = file.max_download_fraction {
            self.max_download_fraction = fraction;
        }
        if let Some(agent) = file.user_agent {
            self.user_agent = agent;
        }
        self
    }
}

fn config_error(message: &str) -> Error {
    Error::ConfigError {
        message: message.to_string(),
    }
}

/// Builder for [`ClientConfig`].
///
/// # Examples
///
/// ```
/// use marketplace_core::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .max_parallel_connections(4)
///     .max_download_fraction(0.5)
///     .build();
///
/// assert_eq!(config.max_parallel_connections, 4);
/// ```
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Sets the repository base URL.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the concurrent connection limit.
    #[must_use]
    pub const fn max_parallel_connections(mut self, limit: usize) -> Self {
        self.config.max_parallel_connections = limit;
        self
    }

    /// Sets the delta download threshold.
    #[must_use]
    pub const fn max_download_fraction(mut self, fraction: f64) -> Self {
        self.config.max_download_fraction = fraction;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.host, "https://plugins.jetbrains.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(300));
        assert_eq!(config.read_timeout, Duration::from_secs(300));
        assert_eq!(config.max_parallel_connections, 16);
        assert!((config.max_download_fraction - 0.65).abs() < f64::EPSILON);
        assert!(config.user_agent.starts_with("marketplace-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = ClientConfig {
            max_parallel_connections: 0,
            ..Default::default()
        };
        assert!(invalid.validate().unwrap_err().is_config_error());

        let invalid = ClientConfig {
            read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = ClientConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_download_fraction_bounds() {
        for fraction in [0.0, -0.1, 1.01, f64::NAN] {
            let config = ClientConfig::builder()
                .max_download_fraction(fraction)
                .build();
            assert!(config.validate().is_err(), "fraction {fraction} accepted");
        }

        let config = ClientConfig::builder().max_download_fraction(1.0).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_fluent_interface() {
        let config = ClientConfig::builder()
            .host("http://localhost:8080")
            .connect_timeout(Duration::from_secs(1))
            .read_timeout(Duration::from_secs(2))
            .max_parallel_connections(2)
            .max_download_fraction(0.3)
            .user_agent("test-agent")
            .build();

        assert_eq!(config.host, "http://localhost:8080");
        assert_eq!(config.connect_timeout.as_secs(), 1);
        assert_eq!(config.read_timeout.as_secs(), 2);
        assert_eq!(config.max_parallel_connections, 2);
        assert_eq!(config.user_agent, "test-agent");
    }

    #[test]
    fn test_from_toml_str_partial() {
        let config = ClientConfig::from_toml_str(
            r#"
            host = "https://plugins.example.org"
            read_timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "https://plugins.example.org");
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(300));
        assert_eq!(config.max_parallel_connections, 16);
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_keys() {
        let err = ClientConfig::from_toml_str("hots = \"typo\"").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_parallel_connections = 3").unwrap();
        writeln!(file, "max_download_fraction = 0.5").unwrap();

        let config = ClientConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.max_parallel_connections, 3);
        assert!((config.max_download_fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_toml_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_toml_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_from_toml_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_parallel_connections = \"many\"").unwrap();

        let err = ClientConfig::from_toml_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_env_override_applied() {
        let config = ClientConfig::default()
            .with_env_overrides(|key| {
                (key == MAX_PARALLEL_CONNECTIONS_ENV).then(|| " 8 ".to_string())
            })
            .unwrap();
        assert_eq!(config.max_parallel_connections, 8);
    }

    #[test]
    fn test_env_override_absent() {
        let config = ClientConfig::default().with_env_overrides(|_| None).unwrap();
        assert_eq!(config.max_parallel_connections, 16);
    }

    #[test]
    fn test_env_override_malformed() {
        let err = ClientConfig::default()
            .with_env_overrides(|_| Some("lots".to_string()))
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains(MAX_PARALLEL_CONNECTIONS_ENV));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user_agent = \"custom/1.0\"").unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.user_agent, "custom/1.0");
    }

    #[test]
    fn test_load_explicit_path_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_download_fraction = 2.0").unwrap();

        assert!(ClientConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_default_path_layout() {
        if let Some(path) = ClientConfig::default_path() {
            assert!(path.ends_with("marketplace/config.toml"));
        }
    }
}
