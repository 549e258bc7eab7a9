//! Synthetic movement for demos and soak testing

use super::{FixStream, LocationProvider, ProviderEvent, ProviderSettings};
use crate::runtime::{TaskGuard, lock};
use crate::{Capability, Coordinate, Fix, ProviderError};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Walking pace in meters per second
const DEFAULT_SPEED_MPS: f64 = 1.4;

/// Maximum heading change per fix in degrees
const MAX_TURN_DEG: f64 = 20.0;

/// Position of the simulated subject, shared between providers observing it
struct WalkState {
    position: Coordinate,
    heading_deg: f64,
    rng: StdRng,
}

impl WalkState {
    /// Advance the subject and report where a sensor with `capability` thinks it is
    fn step(&mut self, distance_m: f64, capability: Capability) -> Fix {
        self.heading_deg =
            (self.heading_deg + self.rng.gen_range(-MAX_TURN_DEG..=MAX_TURN_DEG)).rem_euclid(360.0);
        self.position = self.position.destination(self.heading_deg, distance_m);

        let accuracy = match capability {
            Capability::Foreground => self.rng.gen_range(3.0..25.0),
            Capability::Background => self.rng.gen_range(10.0..80.0),
        };
        Fix::new(self.position, capability).with_accuracy(accuracy)
    }
}

/// Emits a random walk at the configured cadence until stopped
///
/// Foreground instances can simulate the app being backgrounded after a number of fixes;
/// background companions (see [`SimulatedWalkProvider::companion`]) observe the same
/// subject and can report the return to the foreground.
pub struct SimulatedWalkProvider {
    capability: Capability,
    state: Arc<Mutex<WalkState>>,
    speed_mps: f64,
    background_after: Option<usize>,
    foreground_after: Option<usize>,
    emitter: Option<TaskGuard>,
}

impl SimulatedWalkProvider {
    /// Foreground walk starting at `origin`, reproducible for a given `seed`
    pub fn new(origin: Coordinate, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let heading_deg = rng.gen_range(0.0..360.0);
        Self {
            capability: Capability::Foreground,
            state: Arc::new(Mutex::new(WalkState {
                position: origin,
                heading_deg,
                rng,
            })),
            speed_mps: DEFAULT_SPEED_MPS,
            background_after: None,
            foreground_after: None,
            emitter: None,
        }
    }

    /// Another provider with `capability` following the same subject
    pub fn companion(&self, capability: Capability) -> Self {
        Self {
            capability,
            state: self.state.clone(),
            speed_mps: self.speed_mps,
            background_after: None,
            foreground_after: None,
            emitter: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    /// Report `Backgrounded` after `fixes` fixes per run and suspend delivery
    pub fn background_after(mut self, fixes: usize) -> Self {
        self.background_after = Some(fixes);
        self
    }

    /// Report `Foregrounded` after `fixes` fixes per run
    pub fn foreground_after(mut self, fixes: usize) -> Self {
        self.foreground_after = Some(fixes);
        self
    }

    pub fn position(&self) -> Coordinate {
        lock(&self.state).position
    }
}

#[async_trait]
impl LocationProvider for SimulatedWalkProvider {
    fn name(&self) -> &str {
        "simulated-walk"
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    async fn start(&mut self, settings: &ProviderSettings) -> Result<FixStream, ProviderError> {
        if self.emitter.is_some() {
            return Err(ProviderError::AlreadyRunning);
        }

        let (tx, stream) = FixStream::channel();
        let state = self.state.clone();
        let capability = self.capability;
        let interval = settings.interval;
        let step_m = self.speed_mps * interval.as_secs_f64();
        let background_after = self.background_after;
        let foreground_after = self.foreground_after;

        self.emitter = Some(TaskGuard::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so fixes are one interval apart
            ticker.tick().await;
            let mut emitted = 0usize;
            loop {
                ticker.tick().await;
                let fix = lock(&state).step(step_m, capability);
                if tx.send(ProviderEvent::Fix(fix)).await.is_err() {
                    return;
                }
                emitted += 1;

                if background_after == Some(emitted) {
                    let _ = tx.send(ProviderEvent::Backgrounded).await;
                    // A foreground-only source goes quiet until restarted
                    tx.closed().await;
                    return;
                }
                if foreground_after == Some(emitted)
                    && tx.send(ProviderEvent::Foregrounded).await.is_err()
                {
                    return;
                }
            }
        }));
        tracing::debug!(%capability, ?interval, "Simulated walk started");
        Ok(stream)
    }

    async fn stop(&mut self) {
        if self.emitter.take().is_some() {
            tracing::debug!(capability = %self.capability, "Simulated walk stopped");
        }
    }
}
