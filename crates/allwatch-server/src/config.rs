//! Server configuration.

use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// Default capacity of the coordinator's change channel.
pub const DEFAULT_CHANGE_BUFFER: usize = 1024;

/// Default capacity of the raw change feed channel.
pub const DEFAULT_FEED_BUFFER: usize = 1024;

/// Default number of fetch attempts before the backing is declared unavailable.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default pause between fetch attempts in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Default interval between demo mutations in milliseconds.
pub const DEFAULT_CHURN_INTERVAL_MS: u64 = 500;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Capacity of the change channel. Producers wait when it is full.
    pub change_buffer: usize,

    /// Capacity of the raw change feed channel.
    pub feed_buffer: usize,

    /// Attempts per fetch before the coordinator halts.
    pub fetch_attempts: u32,

    /// Pause between fetch attempts.
    pub retry_backoff: Duration,
}

impl CoordinatorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            change_buffer: DEFAULT_CHANGE_BUFFER,
            feed_buffer: DEFAULT_FEED_BUFFER,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Set the change channel capacity.
    pub fn with_change_buffer(mut self, size: usize) -> Self {
        self.change_buffer = size;
        self
    }

    /// Set the feed channel capacity.
    pub fn with_feed_buffer(mut self, size: usize) -> Self {
        self.feed_buffer = size;
        self
    }

    /// Set the number of fetch attempts.
    pub fn with_fetch_attempts(mut self, attempts: u32) -> Self {
        self.fetch_attempts = attempts;
        self
    }

    /// Set the pause between fetch attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.change_buffer == 0 {
            return Err(Error::Config("change buffer must be at least 1".to_string()));
        }
        if self.feed_buffer == 0 {
            return Err(Error::Config("feed buffer must be at least 1".to_string()));
        }
        if self.fetch_attempts == 0 {
            return Err(Error::Config("fetch attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of the demo server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,

    /// Machines in the seeded model.
    pub machines: usize,

    /// Units per seeded application.
    pub units_per_application: usize,

    /// Interval between simulated mutations. None disables churn.
    pub churn_interval: Option<Duration>,

    /// Number of demo watchers.
    pub watchers: usize,

    /// How long to run. None runs until ctrl-c.
    pub run_for: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            machines: 3,
            units_per_application: 2,
            churn_interval: Some(Duration::from_millis(DEFAULT_CHURN_INTERVAL_MS)),
            watchers: 2,
            run_for: None,
        }
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "allwatch-server")]
#[command(version, about = "allwatch change-notification server (demo model)", long_about = None)]
pub struct Args {
    /// Machines in the seeded model.
    #[arg(long, default_value_t = 3)]
    pub machines: usize,

    /// Units per seeded application.
    #[arg(long, default_value_t = 2)]
    pub units: usize,

    /// Milliseconds between simulated mutations. Set to 0 to disable churn.
    #[arg(long, default_value_t = DEFAULT_CHURN_INTERVAL_MS)]
    pub churn_interval: u64,

    /// Number of demo watchers.
    #[arg(long, default_value_t = 2)]
    pub watchers: usize,

    /// Seconds to run before shutting down. Set to 0 to run until ctrl-c.
    #[arg(long, default_value_t = 0)]
    pub duration: u64,

    /// Capacity of the coordinator's change channel.
    #[arg(long, default_value_t = DEFAULT_CHANGE_BUFFER)]
    pub change_buffer: usize,

    /// Fetch attempts before the backing is declared unavailable.
    #[arg(long, default_value_t = DEFAULT_FETCH_ATTEMPTS)]
    pub fetch_attempts: u32,

    /// Milliseconds between fetch attempts.
    #[arg(long, default_value_t = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff: u64,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let churn_interval = if self.churn_interval == 0 {
            None
        } else {
            Some(Duration::from_millis(self.churn_interval))
        };

        let run_for = if self.duration == 0 {
            None
        } else {
            Some(Duration::from_secs(self.duration))
        };

        let coordinator = CoordinatorConfig::new()
            .with_change_buffer(self.change_buffer)
            .with_fetch_attempts(self.fetch_attempts)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff));

        ServerConfig {
            coordinator,
            machines: self.machines,
            units_per_application: self.units,
            churn_interval,
            watchers: self.watchers,
            run_for,
        }
    }
}
