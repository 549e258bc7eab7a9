//! Fix classification
//!
//! All noise handling (bad coordinates, coarse accuracy, duplicates, stationary drift)
//! lives here so the accumulator never has to second-guess a provider.

use crate::{Coordinate, Fix, TrackingConfig, distance};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a fix was not added to the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RejectReason {
    /// Coordinate out of range or not finite, or a nonsensical accuracy value
    MalformedFix,
    /// Accuracy radius coarser than the configured maximum
    LowAccuracy,
    /// Same coordinate as the last accepted fix
    DuplicatePosition,
    /// Moved less than the configured minimum displacement
    InsufficientDisplacement,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MalformedFix => "malformed fix",
            Self::LowAccuracy => "low accuracy",
            Self::DuplicatePosition => "duplicate position",
            Self::InsufficientDisplacement => "insufficient displacement",
        };
        f.write_str(text)
    }
}

/// Outcome of validating a single fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accept,
    Reject(RejectReason),
}

impl Validation {
    #[inline]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Stateless fix classifier built from a [`TrackingConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct FixValidator {
    config: TrackingConfig,
}

impl Default for FixValidator {
    fn default() -> Self {
        Self::new(&TrackingConfig::default())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl FixValidator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Classify `candidate` against the last accepted coordinate.
    ///
    /// Rules are applied in order: range check, accuracy limit, first fix is always
    /// accepted, exact duplicates are dropped, then the minimum displacement filter.
    pub fn validate(&self, candidate: &Fix, last_accepted: Option<Coordinate>) -> Validation {
        if !candidate.coordinate.is_valid() {
            return Validation::Reject(RejectReason::MalformedFix);
        }

        if let Some(accuracy) = candidate.accuracy_meters {
            if accuracy.is_nan() || accuracy < 0.0 {
                return Validation::Reject(RejectReason::MalformedFix);
            }
            if accuracy > self.config.max_accuracy_for(candidate.source) {
                return Validation::Reject(RejectReason::LowAccuracy);
            }
        }

        let Some(last) = last_accepted else {
            return Validation::Accept;
        };

        if last == candidate.coordinate {
            return Validation::Reject(RejectReason::DuplicatePosition);
        }

        if distance(last, candidate.coordinate) < self.config.min_displacement_meters {
            return Validation::Reject(RejectReason::InsufficientDisplacement);
        }

        Validation::Accept
    }
}
