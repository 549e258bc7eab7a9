//! Immutable views of a tracking session, plus the display helpers renderers share

use crate::{Coordinate, Track, TrackPoint};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-level failure cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    PermissionDenied,
    ProviderError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::ProviderError => f.write_str("provider error"),
        }
    }
}

/// Lifecycle state of a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingPermission,
    Active,
    Backgrounded,
    Stopped,
    Failed(ErrorKind),
}

impl SessionState {
    /// Whether fixes are currently being applied
    #[inline]
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Active | Self::Backgrounded)
    }

    /// `Stopped` and `Failed` accept no further fixes
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::AwaitingPermission => f.write_str("awaiting permission"),
            Self::Active => f.write_str("active"),
            Self::Backgrounded => f.write_str("backgrounded"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Published state of a session at one point in time
///
/// Every snapshot is an independent value; later fixes never change a snapshot that has
/// already been handed out.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    pub track: Track,
    pub state: SessionState,
    pub is_tracking: bool,
    /// Most recent session failure; kept after the session stops
    pub last_error: Option<ErrorKind>,
    /// Strictly increasing per session, one step per published snapshot
    pub revision: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            track: Track::default(),
            state: SessionState::Idle,
            is_tracking: false,
            last_error: None,
            revision: 0,
        }
    }
}

impl Snapshot {
    /// Distance label for display, e.g. `"1.25 km"`
    pub fn distance_label(&self) -> String {
        format_distance_km(self.track.cumulative_distance_meters())
    }

    /// Map region centred on the latest position
    pub fn map_region(&self) -> MapRegion {
        let center = self
            .track
            .last_accepted_coordinate()
            .unwrap_or_default();
        MapRegion::around(center)
    }
}

/// Format a distance in meters as kilometres with two decimals
pub fn format_distance_km(meters: f64) -> String {
    format!("{:.2} km", meters / 1000.0)
}

/// Accuracy bucket used to colour polyline segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AccuracyClass {
    /// Accuracy radius under 50 m
    Precise,
    /// Coarser than 50 m, or unknown
    Coarse,
}

impl AccuracyClass {
    pub const PRECISE_BELOW_M: f64 = 50.0;

    pub fn of(point: &TrackPoint) -> Self {
        match point.accuracy_meters {
            Some(accuracy) if accuracy < Self::PRECISE_BELOW_M => Self::Precise,
            _ => Self::Coarse,
        }
    }
}

/// Visible map area: a centre plus the span in degrees on each axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapRegion {
    pub center: Coordinate,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl MapRegion {
    /// Span used when following the subject
    pub const FOLLOW_DELTA_DEG: f64 = 0.009;

    pub fn around(center: Coordinate) -> Self {
        Self {
            center,
            latitude_delta: Self::FOLLOW_DELTA_DEG,
            longitude_delta: Self::FOLLOW_DELTA_DEG,
        }
    }
}
