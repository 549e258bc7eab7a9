//! Tracking session controller
//!
//! The controller owns the session state, the single [`TrackAccumulator`] and the
//! provider(s). All mutation happens inside one short critical section (`Core`), entered
//! either by the ingestion task (one per session) or by a control operation. Slow steps
//! such as the permission prompt or a provider handshake run outside it, and the state is
//! re-checked after every await so a concurrent `stop()` always wins.
//!
//! ```text
//! Idle ──start──▶ AwaitingPermission ──granted──▶ Active ◀──▶ Backgrounded
//!   │                    │ denied                    │              │
//!   └────────────────────┴──────▶ Failed ◀───────────┴──────────────┘
//!                   any state ──stop──▶ Stopped
//! ```

use crate::provider::{
    FixStream, LocationProvider, PermissionPrompt, PermissionStatus, ProviderEvent,
    ProviderSettings, StaticPrompt,
};
use crate::runtime::{self, TaskGuard, lock};
use crate::{
    Capability, DeliveryPolicy, ErrorKind, Fix, FixValidator, Result, SessionError,
    SessionState, Snapshot, SnapshotPublisher, Subscription, TrackAccumulator, TrackingConfig,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Accepted and rejected fix totals for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixCounts {
    pub accepted: u64,
    pub rejected: u64,
}

impl FixCounts {
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Primary,
    Background,
}

/// The provider the session was built with, plus an optional background fallback
struct Providers {
    primary: Box<dyn LocationProvider>,
    background: Option<Box<dyn LocationProvider>>,
    active: Slot,
}

impl Providers {
    fn active_mut(&mut self) -> &mut dyn LocationProvider {
        match (self.active, self.background.as_mut()) {
            (Slot::Background, Some(background)) => background.as_mut(),
            _ => self.primary.as_mut(),
        }
    }

    /// Provider that should be delivering in `state`: the background fallback while
    /// backgrounded with a foreground-only primary, otherwise the primary
    fn slot_for(&self, state: SessionState) -> Slot {
        if state == SessionState::Backgrounded
            && self.primary.capability() == Capability::Foreground
            && self.background.is_some()
        {
            Slot::Background
        } else {
            Slot::Primary
        }
    }

    /// Stop every provider, whichever is active
    async fn stop_all(&mut self) {
        self.primary.stop().await;
        if let Some(background) = self.background.as_mut() {
            background.stop().await;
        }
    }
}

/// Everything mutated by fixes and transitions
struct Core {
    state: SessionState,
    /// Set by the first `start()` so a second concurrent call is rejected
    start_claimed: bool,
    config: TrackingConfig,
    accumulator: Option<TrackAccumulator>,
    last_error: Option<ErrorKind>,
    revision: u64,
    ingest: Option<TaskGuard>,
}

impl Core {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            track: self
                .accumulator
                .as_ref()
                .map(TrackAccumulator::track)
                .unwrap_or_default(),
            state: self.state,
            is_tracking: self.state.is_tracking(),
            last_error: self.last_error,
            revision: self.revision,
        }
    }

    fn publish(&mut self, publisher: &SnapshotPublisher) {
        self.revision += 1;
        publisher.publish(self.snapshot());
    }

    fn transition(&mut self, next: SessionState, publisher: &SnapshotPublisher) {
        tracing::info!(from = %self.state, to = %next, "Session state changed");
        if let SessionState::Failed(kind) = next {
            self.last_error = Some(kind);
        }
        self.state = next;
        self.publish(publisher);
    }
}

struct Shared {
    core: Mutex<Core>,
    providers: tokio::sync::Mutex<Providers>,
    prompt: Arc<dyn PermissionPrompt>,
    publisher: SnapshotPublisher,
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        lock(&self.core)
    }

    /// Apply one fix. Returns `false` once the session has finished.
    fn apply(&self, fix: &Fix) -> bool {
        let mut core = self.lock_core();
        if !core.state.is_tracking() {
            tracing::trace!(state = %core.state, "Discarding fix outside an active session");
            return !core.state.is_finished();
        }
        let accepted = core
            .accumulator
            .as_mut()
            .is_some_and(|accumulator| accumulator.apply_fix(fix).is_accepted());
        if accepted {
            core.publish(&self.publisher);
        }
        true
    }

    /// Move a tracking session to `Failed(ProviderError)`.
    /// Returns `false` if the session was not tracking.
    fn mark_failed(&self, reason: &str) -> bool {
        let mut core = self.lock_core();
        if !core.state.is_tracking() {
            return false;
        }
        tracing::warn!(%reason, "Location provider failed");
        core.transition(
            SessionState::Failed(ErrorKind::ProviderError),
            &self.publisher,
        );
        true
    }

    async fn fail(&self, reason: &str) {
        if self.mark_failed(reason) {
            self.providers.lock().await.stop_all().await;
        }
    }

    /// Start the active provider and begin ingesting
    async fn activate(self: &Arc<Self>) -> Result<()> {
        let config = self.lock_core().config.clone();
        let mut providers = self.providers.lock().await;
        let provider = providers.active_mut();
        let settings = ProviderSettings::for_capability(&config, provider.capability());
        let name = provider.name().to_string();

        let stream = match provider.start(&settings).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(provider = %name, "Provider failed to start: {err}");
                {
                    let mut core = self.lock_core();
                    if !core.state.is_finished() {
                        core.transition(
                            SessionState::Failed(ErrorKind::ProviderError),
                            &self.publisher,
                        );
                    }
                }
                providers.stop_all().await;
                return Err(err.into());
            }
        };

        let cancelled = {
            let mut core = self.lock_core();
            if core.state.is_finished() {
                true
            } else {
                core.accumulator = Some(TrackAccumulator::new(FixValidator::new(&core.config)));
                core.transition(SessionState::Active, &self.publisher);
                core.ingest = Some(TaskGuard::spawn(ingest(self.clone(), stream)));
                false
            }
        };
        if cancelled {
            providers.stop_all().await;
            return Err(SessionError::Cancelled);
        }

        tracing::info!(provider = %name, interval = ?settings.interval, "Tracking started");
        Ok(())
    }

    /// Apply a `Backgrounded`/`Foregrounded` report to the session state.
    /// Returns the resulting state, or `None` once the session has finished.
    fn follow_app(&self, next: SessionState) -> Option<SessionState> {
        let mut core = self.lock_core();
        if core.state.is_finished() {
            return None;
        }
        if core.state.is_tracking() && core.state != next {
            core.transition(next, &self.publisher);
        }
        Some(core.state)
    }

    /// Handle a lifecycle report, switching providers if the app state calls for it.
    /// Returns `false` once the session has finished.
    async fn on_app_state(&self, next: SessionState, stream: &mut FixStream) -> bool {
        let Some(state) = self.follow_app(next) else {
            return false;
        };
        let mut providers = self.providers.lock().await;
        if providers.slot_for(state) == providers.active {
            return true;
        }
        self.swap(&mut providers, stream).await
    }

    /// Replace the active provider with the one the current app state calls for.
    ///
    /// Events the outgoing provider had already delivered are processed in order first,
    /// so a buffered error still fails the session and a buffered lifecycle report still
    /// decides which provider comes up.
    async fn swap(&self, providers: &mut Providers, stream: &mut FixStream) -> bool {
        let outgoing = providers.active_mut().name().to_string();
        providers.active_mut().stop().await;

        while let Some(event) = stream.try_next() {
            let keep_going = match event {
                ProviderEvent::Fix(fix) => self.apply(&fix),
                ProviderEvent::Backgrounded => self.follow_app(SessionState::Backgrounded).is_some(),
                ProviderEvent::Foregrounded => self.follow_app(SessionState::Active).is_some(),
                ProviderEvent::Error(message) => {
                    if self.mark_failed(&message) {
                        providers.stop_all().await;
                    }
                    false
                }
            };
            if !keep_going {
                return false;
            }
        }

        let config = {
            let core = self.lock_core();
            providers.active = providers.slot_for(core.state);
            core.config.clone()
        };
        let provider = providers.active_mut();
        let settings = ProviderSettings::for_capability(&config, provider.capability());
        let incoming = provider.name().to_string();

        match provider.start(&settings).await {
            Ok(new_stream) => {
                if self.lock_core().state.is_finished() {
                    providers.stop_all().await;
                    return false;
                }
                *stream = new_stream;
                tracing::info!(from = %outgoing, to = %incoming, interval = ?settings.interval, "Switched location provider");
                true
            }
            Err(err) => {
                let reason = format!("{incoming} failed to start: {err}");
                if self.mark_failed(&reason) {
                    providers.stop_all().await;
                }
                false
            }
        }
    }
}

/// Single ingestion path: consumes the active provider's events until the session ends
async fn ingest(shared: Arc<Shared>, mut stream: FixStream) {
    loop {
        let Some(event) = stream.next().await else {
            shared.fail("fix stream ended unexpectedly").await;
            return;
        };
        let keep_going = match event {
            ProviderEvent::Fix(fix) => shared.apply(&fix),
            ProviderEvent::Backgrounded => {
                shared.on_app_state(SessionState::Backgrounded, &mut stream).await
            }
            ProviderEvent::Foregrounded => {
                shared.on_app_state(SessionState::Active, &mut stream).await
            }
            ProviderEvent::Error(message) => {
                shared.fail(&message).await;
                false
            }
        };
        if !keep_going {
            return;
        }
    }
}

/// Builder for [`SessionController`]
pub struct SessionControllerBuilder {
    primary: Box<dyn LocationProvider>,
    background: Option<Box<dyn LocationProvider>>,
    prompt: Option<Arc<dyn PermissionPrompt>>,
    policy: DeliveryPolicy,
}

impl SessionControllerBuilder {
    /// Provider to switch to while the app is backgrounded, if the primary is
    /// foreground-only
    pub fn background_provider(mut self, provider: impl LocationProvider + 'static) -> Self {
        self.background = Some(Box::new(provider));
        self
    }

    pub fn permission_prompt(mut self, prompt: Arc<dyn PermissionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> SessionController {
        let prompt = self.prompt.unwrap_or_else(|| {
            if self.primary.requires_permission() {
                tracing::warn!(
                    provider = self.primary.name(),
                    "No permission prompt configured; location access will be denied"
                );
            }
            Arc::new(StaticPrompt::new(PermissionStatus::Denied))
        });

        let shared = Shared {
            core: Mutex::new(Core {
                state: SessionState::Idle,
                start_claimed: false,
                config: TrackingConfig::default(),
                accumulator: None,
                last_error: None,
                revision: 0,
                ingest: None,
            }),
            providers: tokio::sync::Mutex::new(Providers {
                primary: self.primary,
                background: self.background,
                active: Slot::Primary,
            }),
            prompt,
            publisher: SnapshotPublisher::new(self.policy),
        };
        SessionController {
            shared: Arc::new(shared),
        }
    }
}

/// Owner of one tracking session, from `start()` to `stop()`
///
/// A session runs once: after `Stopped` (or `Failed`) a new controller is needed.
/// Dropping the controller ends the session and tears down its providers.
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn builder(provider: impl LocationProvider + 'static) -> SessionControllerBuilder {
        SessionControllerBuilder {
            primary: Box::new(provider),
            background: None,
            prompt: None,
            policy: DeliveryPolicy::default(),
        }
    }

    /// Controller with default settings and no permission prompt
    pub fn new(provider: impl LocationProvider + 'static) -> Self {
        Self::builder(provider).build()
    }

    /// Begin tracking.
    ///
    /// Asks for permission first when the provider requires it. Returns once the provider
    /// is delivering, or with the reason the session failed. Only valid from `Idle`.
    pub async fn start(&self, config: TrackingConfig) -> Result<()> {
        config.validate()?;
        {
            let mut core = self.shared.lock_core();
            if core.state != SessionState::Idle || core.start_claimed {
                return Err(SessionError::InvalidTransition {
                    operation: "start",
                    state: core.state,
                });
            }
            core.start_claimed = true;
            core.config = config;
        }

        let (capability, needs_permission) = {
            let mut providers = self.shared.providers.lock().await;
            let provider = providers.active_mut();
            (provider.capability(), provider.requires_permission())
        };

        if needs_permission {
            {
                let mut core = self.shared.lock_core();
                if core.state != SessionState::Idle {
                    return Err(SessionError::Cancelled);
                }
                core.transition(SessionState::AwaitingPermission, &self.shared.publisher);
            }

            let status = self.shared.prompt.request(capability).await;

            {
                let mut core = self.shared.lock_core();
                if core.state != SessionState::AwaitingPermission {
                    return Err(SessionError::Cancelled);
                }
                if status == PermissionStatus::Denied {
                    tracing::warn!(%capability, "Location permission denied");
                    core.transition(
                        SessionState::Failed(ErrorKind::PermissionDenied),
                        &self.shared.publisher,
                    );
                    return Err(SessionError::PermissionDenied);
                }
            }
            tracing::info!(%capability, "Location permission granted");
        }

        self.shared.activate().await
    }

    /// End the session.
    ///
    /// The final `Stopped` snapshot is published before this returns and nothing is
    /// published afterwards; fixes still in flight are discarded. Calling it again is a
    /// no-op.
    pub async fn stop(&self) {
        let ingest = {
            let mut core = self.shared.lock_core();
            if core.state == SessionState::Stopped {
                return;
            }
            core.transition(SessionState::Stopped, &self.shared.publisher);
            self.shared.publisher.close();
            core.ingest.take()
        };
        // Aborts the ingestion task
        drop(ingest);

        self.shared.providers.lock().await.stop_all().await;
    }

    /// Latest state of the session
    pub fn current_snapshot(&self) -> Snapshot {
        self.shared.lock_core().snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock_core().state
    }

    pub fn fix_counts(&self) -> FixCounts {
        let core = self.shared.lock_core();
        core.accumulator
            .as_ref()
            .map(|accumulator| FixCounts {
                accepted: accumulator.accepted_count(),
                rejected: accumulator.rejected_count(),
            })
            .unwrap_or_default()
    }

    /// Receive every snapshot published from now on (see [`SnapshotPublisher::subscribe`])
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        self.shared.publisher.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.shared.publisher.unsubscribe(subscription);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let ingest = {
            let mut core = self.shared.lock_core();
            if core.state == SessionState::Stopped {
                return;
            }
            if !core.state.is_finished() {
                core.transition(SessionState::Stopped, &self.shared.publisher);
            }
            self.shared.publisher.close();
            core.ingest.take()
        };
        drop(ingest);

        if runtime::in_runtime_context() {
            let shared = self.shared.clone();
            runtime::spawn(async move {
                shared.providers.lock().await.stop_all().await;
            });
        } else {
            tracing::warn!("Session dropped outside a Tokio runtime; providers stop when freed");
        }
    }
}
