//! Refresh scheduler configuration.

use std::time::Duration;

/// Default interval between refresh passes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Smallest accepted refresh interval. Anything lower would busy-loop the
/// directories.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the metadata refresh scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Interval between refresh passes.
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn builder() -> RefreshConfigBuilder {
        RefreshConfigBuilder::default()
    }

    /// The configured interval, clamped to [`MIN_REFRESH_INTERVAL`].
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_REFRESH_INTERVAL)
    }
}

/// Builder for [`RefreshConfig`].
#[derive(Debug, Default)]
pub struct RefreshConfigBuilder {
    interval: Option<Duration>,
}

impl RefreshConfigBuilder {
    /// Set the refresh interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn build(self) -> RefreshConfig {
        RefreshConfig {
            interval: self.interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        assert_eq!(RefreshConfig::default().interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_sets_interval() {
        let config = RefreshConfig::builder()
            .interval(Duration::from_secs(120))
            .build();
        assert_eq!(config.interval, Duration::from_secs(120));
    }

    #[test]
    fn test_effective_interval_enforces_minimum() {
        let config = RefreshConfig::builder()
            .interval(Duration::from_millis(10))
            .build();
        assert_eq!(config.effective_interval(), MIN_REFRESH_INTERVAL);
    }
}
