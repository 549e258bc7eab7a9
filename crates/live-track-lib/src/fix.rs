//! Raw position reports as delivered by a location provider

use crate::Coordinate;
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery capability of a provider, and the origin recorded on each fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Capability {
    /// Delivers only while the app is in the foreground
    Foreground,
    /// Keeps delivering while backgrounded, at a coarser cadence
    Background,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => f.write_str("foreground"),
            Self::Background => f.write_str("background"),
        }
    }
}

/// One raw position report
///
/// Fixes are immutable once created. The timestamp is whatever the provider reported and
/// is not assumed to be monotonic.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fix {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters, if the provider knows it
    pub accuracy_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: Capability,
}

impl Fix {
    /// Create a fix stamped with the current wall-clock time and unknown accuracy
    pub fn new(coordinate: Coordinate, source: Capability) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
