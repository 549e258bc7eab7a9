//! Tracking configuration

use crate::{Capability, ConfigError};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accuracy limit applied to foreground fixes when no explicit maximum is configured
pub const DEFAULT_FOREGROUND_MAX_ACCURACY_M: f64 = 50.0;

/// Accuracy limit applied to background fixes when no explicit maximum is configured.
/// Background services run in a power-saving, low-accuracy mode.
pub const DEFAULT_BACKGROUND_MAX_ACCURACY_M: f64 = 100.0;

/// Configuration for a tracking session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingConfig {
    /// Reject fixes whose accuracy radius is coarser than this.
    /// `None` selects a per-source default (50 m foreground, 100 m background).
    pub max_accuracy_meters: Option<f64>,
    /// Suppress movement shorter than this distance from the last accepted fix.
    /// Default: 0 (disabled)
    pub min_displacement_meters: f64,
    /// Foreground polling cadence in milliseconds. Default: 1000
    pub poll_interval_ms: u64,
    /// Background delivery cadence in milliseconds. Default: 5000
    pub background_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_accuracy_meters: None,
            min_displacement_meters: 0.0,
            poll_interval_ms: 1_000,
            background_interval_ms: 5_000,
        }
    }
}

impl TrackingConfig {
    /// Check thresholds and intervals for values no provider could honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.max_accuracy_meters {
            check_threshold("max_accuracy_meters", max)?;
        }
        check_threshold("min_displacement_meters", self.min_displacement_meters)?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "poll_interval_ms",
            });
        }
        if self.background_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "background_interval_ms",
            });
        }
        Ok(())
    }

    /// Effective accuracy limit for fixes coming from `source`
    pub fn max_accuracy_for(&self, source: Capability) -> f64 {
        self.max_accuracy_meters.unwrap_or(match source {
            Capability::Foreground => DEFAULT_FOREGROUND_MAX_ACCURACY_M,
            Capability::Background => DEFAULT_BACKGROUND_MAX_ACCURACY_M,
        })
    }

    /// Delivery cadence for a provider with the given capability
    pub fn interval_for(&self, capability: Capability) -> Duration {
        match capability {
            Capability::Foreground => Duration::from_millis(self.poll_interval_ms),
            Capability::Background => Duration::from_millis(self.background_interval_ms),
        }
    }
}

fn check_threshold(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TrackingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let config = TrackingConfig {
            min_displacement_meters: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold {
                field: "min_displacement_meters",
                ..
            })
        ));

        let config = TrackingConfig {
            max_accuracy_meters: Some(f64::NAN),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = TrackingConfig {
            background_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                field: "background_interval_ms"
            })
        );
    }

    #[test]
    fn test_source_specific_accuracy() {
        let config = TrackingConfig::default();
        assert_eq!(config.max_accuracy_for(Capability::Foreground), 50.0);
        assert_eq!(config.max_accuracy_for(Capability::Background), 100.0);

        let config = TrackingConfig {
            max_accuracy_meters: Some(30.0),
            ..Default::default()
        };
        assert_eq!(config.max_accuracy_for(Capability::Foreground), 30.0);
        assert_eq!(config.max_accuracy_for(Capability::Background), 30.0);
    }

    #[test]
    fn test_interval_for_capability() {
        let config = TrackingConfig::default();
        assert_eq!(
            config.interval_for(Capability::Foreground),
            Duration::from_secs(1)
        );
        assert_eq!(
            config.interval_for(Capability::Background),
            Duration::from_secs(5)
        );
    }
}
