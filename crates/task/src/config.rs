//! Timer task configuration.

use std::time::Duration;

/// Configuration for a [`RepeatedTimerTask`](crate::RepeatedTimerTask).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTaskConfig {
    /// Label used in logs and metrics.
    pub name: String,

    /// Interval between the end of one fire and the next arm.
    pub timeout: Duration,
}

impl Default for TimerTaskConfig {
    fn default() -> Self {
        Self {
            name: "timer".to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

impl TimerTaskConfig {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = TimerTaskConfig::default()
            .with_name("election")
            .with_timeout(Duration::from_millis(150));

        assert_eq!(config.name, "election");
        assert_eq!(config.timeout, Duration::from_millis(150));
        assert_eq!(config, TimerTaskConfig::new("election", Duration::from_millis(150)));
    }
}
