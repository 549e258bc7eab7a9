//! Location providers
//!
//! A provider turns some platform source of positions into a [`FixStream`]. The session
//! controller only sees the [`LocationProvider`] trait, so foreground polling and
//! background services are interchangeable, and nothing downstream assumes fixes arrive
//! evenly spaced, in order or without duplicates.
//!
//! Shipped implementations:
//! - [`ScriptedProvider`]: replays a fixed list of events
//! - [`ChannelProvider`]: bridges push-style platform callbacks through a [`ChannelFeed`]
//! - [`SimulatedWalkProvider`]: synthetic movement at the configured cadence
//! - [`GpxReplayProvider`]: replays a recorded GPX track

mod gpx_replay;
mod scripted;
mod walk;

pub use gpx_replay::GpxReplayProvider;
pub use scripted::{ChannelFeed, ChannelProvider, ScriptedProvider};
pub use walk::SimulatedWalkProvider;

use crate::{Capability, Fix, ProviderError, TrackingConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the channel between a provider and the ingestion task.
/// Providers wait when it is full rather than dropping fixes.
pub const EVENT_BUFFER: usize = 256;

/// Something a provider reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Fix(Fix),
    /// The app moved to the background
    Backgrounded,
    /// The app returned to the foreground
    Foregrounded,
    /// Unrecoverable platform error; the session fails
    Error(String),
}

/// Receiving end of a provider's event channel
#[derive(Debug)]
pub struct FixStream {
    rx: mpsc::Receiver<ProviderEvent>,
}

impl FixStream {
    /// Create a connected sender/stream pair with [`EVENT_BUFFER`] capacity
    pub fn channel() -> (mpsc::Sender<ProviderEvent>, FixStream) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (tx, FixStream { rx })
    }

    /// Next event, or `None` once the provider has dropped its sender
    pub async fn next(&mut self) -> Option<ProviderEvent> {
        self.rx.recv().await
    }

    /// Next already-buffered event, without waiting
    pub fn try_next(&mut self) -> Option<ProviderEvent> {
        self.rx.try_recv().ok()
    }
}

impl From<mpsc::Receiver<ProviderEvent>> for FixStream {
    fn from(rx: mpsc::Receiver<ProviderEvent>) -> Self {
        Self { rx }
    }
}

/// Settings handed to a provider when it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Target delay between fixes
    pub interval: Duration,
}

impl ProviderSettings {
    /// Cadence for `capability` taken from `config`
    pub fn for_capability(config: &TrackingConfig, capability: Capability) -> Self {
        Self {
            interval: config.interval_for(capability),
        }
    }
}

/// A source of fixes whose lifecycle is managed by the session controller
#[async_trait]
pub trait LocationProvider: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Whether the user must grant location access before `start`.
    /// Foreground providers require it by default.
    fn requires_permission(&self) -> bool {
        self.capability() == Capability::Foreground
    }

    /// Begin delivering events
    async fn start(&mut self, settings: &ProviderSettings) -> Result<FixStream, ProviderError>;

    /// Stop delivering events and release platform resources. Must be idempotent.
    async fn stop(&mut self);
}

/// Answer from the permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// External collaborator asking the user for location access
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self, capability: Capability) -> PermissionStatus;
}

/// Prompt that always gives the same answer
#[derive(Debug)]
pub struct StaticPrompt {
    status: PermissionStatus,
    asked: AtomicUsize,
}

impl StaticPrompt {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn granting() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    pub fn denying() -> Self {
        Self::new(PermissionStatus::Denied)
    }

    /// How many times the prompt was shown
    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionPrompt for StaticPrompt {
    async fn request(&self, capability: Capability) -> PermissionStatus {
        self.asked.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%capability, status = ?self.status, "Static permission prompt answered");
        self.status
    }
}
