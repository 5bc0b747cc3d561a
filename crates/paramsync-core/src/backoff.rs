// ── Retry backoff ──

use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

/// Exponential backoff for snapshot retries.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,

    /// Growth factor per attempt. Default: 2.0.
    pub multiplier: f64,

    /// Upper bound on any single delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum random stretch, as a fraction of the base delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `delay = min(initial * multiplier^attempt * (1 + r), max)` with `r`
    /// drawn uniformly from `[0, jitter]`. Jitter only ever stretches the
    /// delay, so with `multiplier > 1 + jitter` consecutive delays strictly
    /// increase until they hit the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let stretch = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter)
        } else {
            0.0
        };
        let capped = (base * (1.0 + stretch)).min(self.max_delay.as_secs_f64());

        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.max_delay)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial_delay.is_zero() {
            return Err(config_error("backoff initial delay must be positive"));
        }
        if self.max_delay < self.initial_delay {
            return Err(config_error(
                "backoff max delay must not be shorter than the initial delay",
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(config_error("backoff jitter must be in [0, 1)"));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 + self.jitter {
            return Err(config_error(format!(
                "backoff multiplier must exceed 1 + jitter ({})",
                1.0 + self.jitter
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_config() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_increases_strictly() {
        let config = BackoffConfig::default();

        for _ in 0..50 {
            let d0 = config.delay(0);
            let d1 = config.delay(1);
            let d2 = config.delay(2);
            assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
            assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = BackoffConfig::default();
        for _ in 0..50 {
            let d = config.delay(1);
            assert!(d >= Duration::from_millis(1000));
            assert!(d <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(10),
            ..BackoffConfig::default()
        };
        assert_eq!(config.delay(10), Duration::from_secs(10));
        assert_eq!(config.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let config = BackoffConfig {
            jitter: 0.0,
            ..BackoffConfig::default()
        };
        assert_eq!(config.delay(2), Duration::from_secs(2));
    }

    #[test]
    fn multiplier_must_outgrow_jitter() {
        let config = BackoffConfig {
            multiplier: 1.2,
            jitter: 0.25,
            ..BackoffConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }
}
