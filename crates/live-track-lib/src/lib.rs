//! Live Track Library - Core engine for live location tracking
//!
//! This library consumes raw position fixes from a pluggable location provider, filters
//! noise, accumulates an append-only track with a running distance total, and publishes
//! immutable snapshots of the tracking session to any number of subscribers.
//!
//! # Architecture
//!
//! - **[`distance`]**: Great-circle distance between two [`Coordinate`]s
//! - **[`FixValidator`]**: Accept/reject classification of a raw [`Fix`]
//! - **[`TrackAccumulator`]**: Append-only [`Track`] with O(1) distance updates
//! - **[`LocationProvider`]**: Foreground/background fix sources behind one trait
//! - **[`SessionController`]**: Lifecycle state machine owning the track and providers
//! - **[`SnapshotPublisher`]**: Non-blocking fan-out of [`Snapshot`]s
//!
//! # Data flow
//!
//! Provider → [`Fix`] → [`FixValidator`] → [`TrackAccumulator`] → [`Snapshot`] →
//! [`SnapshotPublisher`] → subscribers. The controller supervises provider start/stop and
//! owns error recovery.

mod config;
mod fix;
mod geodesy;
pub mod provider;
mod publisher;
mod runtime;
mod session;
mod snapshot;
mod track;
mod validator;

// Public API exports
pub use config::TrackingConfig;
pub use fix::{Capability, Fix};
pub use geodesy::{Coordinate, EARTH_RADIUS_M, distance};
pub use provider::{
    FixStream, LocationProvider, PermissionPrompt, PermissionStatus, ProviderEvent,
    ProviderSettings, StaticPrompt,
};
pub use publisher::{DeliveryPolicy, SnapshotPublisher, Subscription};
pub use session::{FixCounts, SessionController, SessionControllerBuilder};
pub use snapshot::{
    AccuracyClass, ErrorKind, MapRegion, SessionState, Snapshot, format_distance_km,
};
pub use track::{FixOutcome, Track, TrackAccumulator, TrackPoint};
pub use validator::{FixValidator, RejectReason, Validation};

/// Errors returned by session control operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("location permission denied")]
    PermissionDenied,

    #[error("session was stopped before start completed")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by location providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to start provider: {0}")]
    Start(String),

    #[error("provider is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GPX parsing error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("GPX data contains no track points")]
    EmptyTrack,
}

/// Errors found while validating a [`TrackingConfig`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

pub type Result<T> = std::result::Result<T, SessionError>;
