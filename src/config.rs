//! Options recognised by the reader worker and device manager.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub poll_period: Duration,
    pub device_check_interval: Duration,
    pub card_check_interval: Duration,
    pub operation_timeout: Duration,
    pub device_cooldown: Duration,
    pub max_retries_cooldown: Duration,
    pub max_retries: u32,
    pub reader_mode: ReaderMode,
    /// Presence TTL used by the `TagCache`. Defaults to `2 * poll_period`.
    pub presence_ttl: Duration,
    /// How long a proxied-mobile session stays valid without a heartbeat.
    pub smartphone_device_timeout: Duration,
    /// Sleep between tag iterations inside a single poll, so reader
    /// hardware gets a chance to recover.
    pub default_polling_interval: Duration,
    /// Sleep used while the worker has no device, or is in cooldown.
    pub device_idle_check_interval: Duration,
    /// Poll interval the worker uses to notice an in-flight external write.
    pub write_check_interval: Duration,
    /// Pause after a transient device error before attempting reconnect.
    pub post_error_pause_time: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let poll_period = Duration::from_millis(100);
        Self {
            poll_period,
            device_check_interval: Duration::from_secs(2),
            card_check_interval: Duration::from_millis(250),
            operation_timeout: Duration::from_secs(5),
            device_cooldown: Duration::from_secs(10),
            max_retries_cooldown: Duration::from_secs(30),
            max_retries: 5,
            reader_mode: ReaderMode::ReadWrite,
            presence_ttl: poll_period * 2,
            smartphone_device_timeout: Duration::from_secs(15),
            default_polling_interval: poll_period,
            device_idle_check_interval: Duration::from_millis(500),
            write_check_interval: Duration::from_millis(50),
            post_error_pause_time: Duration::from_millis(500),
        }
    }
}

impl ReaderConfig {
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder(Self::default())
    }
}

/// Small fluent builder over owned fields rather than a config-file/env
/// parsing layer (no such layer is in scope).
pub struct ReaderConfigBuilder(ReaderConfig);

impl ReaderConfigBuilder {
    pub fn poll_period(mut self, d: Duration) -> Self {
        self.0.poll_period = d;
        self.0.default_polling_interval = d;
        self.0.presence_ttl = d * 2;
        self
    }

    pub fn reader_mode(mut self, mode: ReaderMode) -> Self {
        self.0.reader_mode = mode;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.0.max_retries = n;
        self
    }

    pub fn operation_timeout(mut self, d: Duration) -> Self {
        self.0.operation_timeout = d;
        self
    }

    pub fn build(self) -> ReaderConfig {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ReaderConfig::default();
        assert_eq!(c.poll_period, Duration::from_millis(100));
        assert_eq!(c.device_check_interval, Duration::from_secs(2));
        assert_eq!(c.card_check_interval, Duration::from_millis(250));
        assert_eq!(c.operation_timeout, Duration::from_secs(5));
        assert_eq!(c.device_cooldown, Duration::from_secs(10));
        assert_eq!(c.max_retries_cooldown, Duration::from_secs(30));
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.presence_ttl, Duration::from_millis(200));
    }

    #[test]
    fn builder_overrides_poll_period_and_presence_ttl() {
        let c = ReaderConfig::builder()
            .poll_period(Duration::from_millis(50))
            .build();
        assert_eq!(c.presence_ttl, Duration::from_millis(100));
    }
}
