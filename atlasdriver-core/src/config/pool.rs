//! Pool tuning options.

use std::time::Duration;

/// Tuning knobs for the connection pool.
///
/// # Example
/// ```rust
/// use atlasdriver_core::config::PoolOptions;
/// use std::time::Duration;
///
/// let options = PoolOptions::default()
///     .with_max_size(5)
///     .with_acquire_timeout(Duration::from_secs(10));
///
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Idle connections kept alive by the eviction sweep
    pub min_size: usize,
    /// Hard cap on physical connections
    pub max_size: usize,
    /// How long `acquire` waits for a free slot
    pub acquire_timeout: Duration,
    /// Idle time after which a connection becomes eligible for eviction
    pub idle_timeout: Duration,
    /// Period of the idle eviction sweep
    pub eviction_interval: Duration,
    /// Probe connections before handing them out
    pub test_on_borrow: bool,
    /// Probe connections when they come back
    pub test_on_return: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 3,
            acquire_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(30),
            eviction_interval: Duration::from_secs(10),
            test_on_borrow: true,
            test_on_return: false,
        }
    }
}

impl PoolOptions {
    /// Validates the pool options.
    ///
    /// # Errors
    /// Returns a configuration error if the sizes or timeouts are unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_size == 0 {
            return Err(crate::error::AtlasDriverError::configuration(
                "max pool size must be greater than 0",
            ));
        }

        if self.min_size > self.max_size {
            return Err(crate::error::AtlasDriverError::configuration(format!(
                "min pool size ({}) cannot exceed max pool size ({})",
                self.min_size, self.max_size
            )));
        }

        if self.acquire_timeout.is_zero() {
            return Err(crate::error::AtlasDriverError::configuration(
                "acquire timeout must be greater than 0",
            ));
        }

        if self.eviction_interval.is_zero() {
            return Err(crate::error::AtlasDriverError::configuration(
                "eviction interval must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Set minimum pool size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set eviction sweep interval
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = interval;
        self
    }

    /// Enable/disable test on borrow
    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }

    /// Enable/disable test on return
    pub fn with_test_on_return(mut self, test: bool) -> Self {
        self.test_on_return = test;
        self
    }
}
