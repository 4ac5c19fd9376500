//! Configuration files.
//!
//! The configuration is stored as TOML. Every section has sensible defaults so an empty or
//! missing file yields a working setup:
//!
//! ```toml
//! [retry]
//! base_delay = "100ms"
//! ceiling = "10s"
//!
//! [session]
//! socket_path = "/tmp/txq/session.sock"
//! fast_poll = "100ms"
//! slow_poll = "1s"
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Default location of the session socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/txq/session.sock";

/// Errors raised while loading, storing or validating a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("failed to access config file {}: {source}", path.display())]
    File {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: confy::ConfyError,
    },
    /// A value is out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Configuration for the txq components.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Default backoff used by components without their own section.
    pub retry: RetryConfig,
    /// Session server configuration.
    pub session: SessionConfig,
    /// Confirmation filter configuration.
    pub sync: SyncConfig,
}

impl Config {
    /// Loads the configuration from the given TOML file.
    ///
    /// If the file does not exist it is created with the default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Self = confy::load_path(path)
            .map_err(|source| ConfigError::File { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// Stores the configuration at the given path.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        confy::store_path(path, self)
            .map_err(|source| ConfigError::File { path: path.to_path_buf(), source })
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate("retry")?;
        self.sync.retry.validate("sync.retry")?;
        self.session.validate()
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry. Doubles on every further attempt.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum cumulative delay before giving up.
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub const fn new(base_delay: Duration, ceiling: Duration) -> Self {
        Self { base_delay, ceiling }
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::Invalid {
                field: section,
                reason: "base_delay must be greater than zero".to_string(),
            })
        }
        if self.base_delay > self.ceiling {
            return Err(ConfigError::Invalid {
                field: section,
                reason: format!(
                    "base_delay ({:?}) exceeds ceiling ({:?})",
                    self.base_delay, self.ceiling
                ),
            })
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(100), ceiling: Duration::from_secs(10) }
    }
}

/// Session server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Filesystem path of the unix domain socket.
    pub socket_path: PathBuf,
    /// Accept timeout used after a request that did useful work.
    #[serde(with = "humantime_serde")]
    pub fast_poll: Duration,
    /// Accept timeout used while idle. Also the initial accept timeout.
    #[serde(with = "humantime_serde")]
    pub slow_poll: Duration,
    /// Read timeout applied to an accepted peer.
    #[serde(with = "humantime_serde")]
    pub receive_timeout: Duration,
    /// Upper bound for a single request line, in bytes.
    pub max_request_size: usize,
    /// Backoff used when the processor reports a backend failure.
    pub retry: RetryConfig,
}

impl SessionConfig {
    /// Returns a configuration bound to the given socket path, defaults otherwise.
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into(), ..Default::default() }
    }

    /// Sets the fast and slow accept timeouts.
    pub const fn with_poll(mut self, fast_poll: Duration, slow_poll: Duration) -> Self {
        self.fast_poll = fast_poll;
        self.slow_poll = slow_poll;
        self
    }

    /// Sets the backoff used around the processor.
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the poll, receive and retry settings of the session server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_poll.is_zero() {
            return Err(ConfigError::Invalid {
                field: "session.fast_poll",
                reason: "poll timeout must be greater than zero".to_string(),
            })
        }
        if self.fast_poll > self.slow_poll {
            return Err(ConfigError::Invalid {
                field: "session.fast_poll",
                reason: format!(
                    "fast_poll ({:?}) is slower than slow_poll ({:?})",
                    self.fast_poll, self.slow_poll
                ),
            })
        }
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "session.receive_timeout",
                reason: "receive timeout must be greater than zero".to_string(),
            })
        }
        if self.max_request_size == 0 {
            return Err(ConfigError::Invalid {
                field: "session.max_request_size",
                reason: "must be greater than zero".to_string(),
            })
        }
        self.retry.validate("session.retry")
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            fast_poll: Duration::from_millis(100),
            slow_poll: Duration::from_secs(1),
            receive_timeout: Duration::from_millis(100),
            max_request_size: 1024 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// Confirmation filter configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backoff used around queue lookups and writes.
    pub retry: RetryConfig,
}
