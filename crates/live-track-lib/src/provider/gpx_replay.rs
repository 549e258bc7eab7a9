//! Replays a recorded GPX track as a live fix stream

use super::{FixStream, LocationProvider, ProviderEvent, ProviderSettings};
use crate::runtime::TaskGuard;
use crate::{Capability, Coordinate, Fix, ProviderError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rough conversion from horizontal dilution of precision to an accuracy radius in meters
const HDOP_TO_METERS: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
struct ReplayPoint {
    coordinate: Coordinate,
    accuracy_meters: Option<f64>,
}

/// Emits every track point of a GPX file, one per interval
///
/// Replay resumes where it left off when the provider is restarted. Once every point has
/// been delivered the stream stays open without further fixes, so a finished replay is
/// not mistaken for a provider failure.
pub struct GpxReplayProvider {
    capability: Capability,
    points: Arc<[ReplayPoint]>,
    cursor: Arc<AtomicUsize>,
    emitter: Option<TaskGuard>,
}

impl GpxReplayProvider {
    /// Load the track points of a GPX file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let gpx = gpx::read(reader)?;
        tracing::info!(path = %path.as_ref().display(), "Loaded GPX track for replay");
        Self::from_gpx(&gpx)
    }

    /// Collect the track points of parsed GPX data, in document order
    pub fn from_gpx(gpx: &gpx::Gpx) -> Result<Self, ProviderError> {
        let points: Vec<ReplayPoint> = gpx
            .tracks
            .iter()
            .flat_map(|track| &track.segments)
            .flat_map(|segment| &segment.points)
            .map(|waypoint| ReplayPoint {
                coordinate: Coordinate::from(waypoint.point()),
                accuracy_meters: waypoint.hdop.map(|hdop| hdop * HDOP_TO_METERS),
            })
            .collect();

        if points.is_empty() {
            return Err(ProviderError::EmptyTrack);
        }

        Ok(Self {
            capability: Capability::Foreground,
            points: points.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
            emitter: None,
        })
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    /// Number of track points in the file
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points not yet delivered
    pub fn remaining(&self) -> usize {
        self.points.len() - self.cursor.load(Ordering::SeqCst).min(self.points.len())
    }
}

#[async_trait]
impl LocationProvider for GpxReplayProvider {
    fn name(&self) -> &str {
        "gpx-replay"
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    async fn start(&mut self, settings: &ProviderSettings) -> Result<FixStream, ProviderError> {
        if self.emitter.is_some() {
            return Err(ProviderError::AlreadyRunning);
        }

        let (tx, stream) = FixStream::channel();
        let points = self.points.clone();
        let cursor = self.cursor.clone();
        let capability = self.capability;
        let interval = settings.interval;

        self.emitter = Some(TaskGuard::spawn(async move {
            loop {
                let index = cursor.load(Ordering::SeqCst);
                let Some(point) = points.get(index) else {
                    break;
                };
                let mut fix = Fix::new(point.coordinate, capability);
                fix.accuracy_meters = point.accuracy_meters;
                if tx.send(ProviderEvent::Fix(fix)).await.is_err() {
                    return;
                }
                cursor.store(index + 1, Ordering::SeqCst);
                tokio::time::sleep(interval).await;
            }
            tracing::info!(points = points.len(), "GPX replay finished");
            tx.closed().await;
        }));
        Ok(stream)
    }

    async fn stop(&mut self) {
        self.emitter = None;
    }
}
