//! Deterministic providers: a fixed event script, and a channel fed by platform callbacks

use super::{FixStream, LocationProvider, ProviderEvent, ProviderSettings};
use crate::runtime::{TaskGuard, lock};
use crate::{Capability, ProviderError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Replays a fixed list of events
///
/// The script is played once; restarting after it was consumed yields a stream that stays
/// open but silent. Useful for reproducing awkward provider behaviour such as bursts,
/// duplicates and out-of-order fixes around a foreground/background switch.
pub struct ScriptedProvider {
    capability: Capability,
    requires_permission: bool,
    events: Vec<ProviderEvent>,
    delay: Duration,
    fail_start: Option<String>,
    close_after_script: bool,
    emitter: Option<TaskGuard>,
}

impl ScriptedProvider {
    pub fn new(capability: Capability, events: Vec<ProviderEvent>) -> Self {
        Self {
            capability,
            requires_permission: capability == Capability::Foreground,
            events,
            delay: Duration::ZERO,
            fail_start: None,
            close_after_script: false,
            emitter: None,
        }
    }

    /// Wait this long before each event
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_permission(mut self, required: bool) -> Self {
        self.requires_permission = required;
        self
    }

    /// Make `start` fail with the given message
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.fail_start = Some(message.into());
        self
    }

    /// End the stream once the script is exhausted instead of keeping it open
    pub fn close_after_script(mut self) -> Self {
        self.close_after_script = true;
        self
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    async fn start(&mut self, _settings: &ProviderSettings) -> Result<FixStream, ProviderError> {
        if let Some(message) = &self.fail_start {
            return Err(ProviderError::Start(message.clone()));
        }
        if self.emitter.is_some() {
            return Err(ProviderError::AlreadyRunning);
        }

        let (tx, stream) = FixStream::channel();
        let events = std::mem::take(&mut self.events);
        let delay = self.delay;
        let close_after_script = self.close_after_script;

        self.emitter = Some(TaskGuard::spawn(async move {
            for event in events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if !close_after_script {
                tx.closed().await;
            }
        }));
        Ok(stream)
    }

    async fn stop(&mut self) {
        self.emitter = None;
    }
}

type SenderSlot = Arc<Mutex<Option<mpsc::Sender<ProviderEvent>>>>;

/// Provider fed from outside through a [`ChannelFeed`]
///
/// This is the adapter for platform layers that push location updates from callbacks:
/// the callback side holds the feed, the session holds the provider.
pub struct ChannelProvider {
    capability: Capability,
    requires_permission: bool,
    slot: SenderSlot,
}

/// Push side of a [`ChannelProvider`]
#[derive(Clone)]
pub struct ChannelFeed {
    slot: SenderSlot,
}

impl ChannelProvider {
    pub fn new(capability: Capability) -> (Self, ChannelFeed) {
        let slot: SenderSlot = Arc::new(Mutex::new(None));
        let provider = Self {
            capability,
            requires_permission: capability == Capability::Foreground,
            slot: slot.clone(),
        };
        (provider, ChannelFeed { slot })
    }

    pub fn with_permission(mut self, required: bool) -> Self {
        self.requires_permission = required;
        self
    }
}

#[async_trait]
impl LocationProvider for ChannelProvider {
    fn name(&self) -> &str {
        "channel"
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn requires_permission(&self) -> bool {
        self.requires_permission
    }

    async fn start(&mut self, _settings: &ProviderSettings) -> Result<FixStream, ProviderError> {
        let mut slot = lock(&self.slot);
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(ProviderError::AlreadyRunning);
        }
        let (tx, stream) = FixStream::channel();
        *slot = Some(tx);
        Ok(stream)
    }

    async fn stop(&mut self) {
        lock(&self.slot).take();
    }
}

impl ChannelFeed {
    /// Deliver `event` to the running provider.
    ///
    /// Returns `false` when the provider is not running or its consumer has gone away.
    pub async fn send(&self, event: ProviderEvent) -> bool {
        let tx = lock(&self.slot).clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.slot).as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Fix};

    fn settings() -> ProviderSettings {
        ProviderSettings {
            interval: Duration::from_millis(10),
        }
    }

    fn fix_event(lat: f64) -> ProviderEvent {
        ProviderEvent::Fix(Fix::new(Coordinate::new(lat, 0.0), Capability::Foreground))
    }

    #[tokio::test]
    async fn test_script_plays_in_order_then_stays_open() {
        let mut provider = ScriptedProvider::new(
            Capability::Foreground,
            vec![fix_event(1.0), ProviderEvent::Backgrounded, fix_event(2.0)],
        );
        let mut stream = provider.start(&settings()).await.unwrap();
        assert_eq!(stream.next().await, Some(fix_event(1.0)));
        assert_eq!(stream.next().await, Some(ProviderEvent::Backgrounded));
        assert_eq!(stream.next().await, Some(fix_event(2.0)));

        let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err(), "stream should stay open");

        provider.stop().await;
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_script_can_close() {
        let mut provider =
            ScriptedProvider::new(Capability::Background, vec![fix_event(1.0)]).close_after_script();
        assert!(!provider.requires_permission());
        let mut stream = provider.start(&settings()).await.unwrap();
        assert_eq!(stream.next().await, Some(fix_event(1.0)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_failing_start() {
        let mut provider =
            ScriptedProvider::new(Capability::Foreground, vec![]).failing_start("no gps");
        let err = provider.start(&settings()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Start(msg) if msg == "no gps"));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut provider = ScriptedProvider::new(Capability::Foreground, vec![]);
        let _stream = provider.start(&settings()).await.unwrap();
        assert!(matches!(
            provider.start(&settings()).await,
            Err(ProviderError::AlreadyRunning)
        ));
        provider.stop().await;
        provider.stop().await;
        assert!(provider.start(&settings()).await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_feed() {
        let (mut provider, feed) = ChannelProvider::new(Capability::Foreground);
        assert!(!feed.is_running());
        assert!(!feed.send(fix_event(1.0)).await);

        let mut stream = provider.start(&settings()).await.unwrap();
        assert!(feed.is_running());
        assert!(feed.send(fix_event(1.0)).await);
        assert_eq!(stream.next().await, Some(fix_event(1.0)));

        provider.stop().await;
        assert!(!feed.is_running());
        assert_eq!(stream.next().await, None);
    }
}
