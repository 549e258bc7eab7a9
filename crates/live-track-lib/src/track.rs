//! Track storage and incremental distance accounting
//!
//! This module provides the append-only `Track` and the `TrackAccumulator` that applies
//! validated fixes to it, keeping the cumulative distance up to date in O(1) per fix.

use crate::{Capability, Coordinate, Fix, FixValidator, RejectReason, Validation, distance};
use chrono::{DateTime, Utc};
use geo::Rect;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One accepted fix, frozen into the track
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPoint {
    pub coordinate: Coordinate,
    /// Position in the track, starting at 1 and strictly increasing
    pub sequence: u64,
    pub accuracy_meters: Option<f64>,
    pub source: Capability,
    pub timestamp: DateTime<Utc>,
}

/// Points per sealed chunk of a [`Track`]
const CHUNK_LEN: usize = 64;

/// Accumulated, validated path of one session plus its running distance
///
/// Points live in sealed, immutable chunks plus a short tail, all shared behind `Arc`s.
/// Cloning a track never copies points, and a clone never changes after it was taken:
/// appending while a clone is alive copies at most the tail.
///
/// Serialized as a flat point list; the chunk layout is rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "TrackRepr", from = "TrackRepr"))]
pub struct Track {
    sealed: Arc<Vec<Arc<[TrackPoint]>>>,
    tail: Arc<Vec<TrackPoint>>,
    cumulative_distance_meters: f64,
    last_accepted_coordinate: Option<Coordinate>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Track {
    /// All accepted points in sequence order
    pub fn points(&self) -> impl DoubleEndedIterator<Item = &TrackPoint> + '_ {
        self.sealed
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.tail.iter())
    }

    /// Point at `index` (0-based, in sequence order)
    pub fn get(&self, index: usize) -> Option<&TrackPoint> {
        let chunk = index / CHUNK_LEN;
        match self.sealed.get(chunk) {
            Some(points) => points.get(index % CHUNK_LEN),
            None => self.tail.get(index - self.sealed.len() * CHUNK_LEN),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sealed.len() * CHUNK_LEN + self.tail.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total distance along the path in meters
    ///
    /// This is O(1) as the value is maintained incrementally.
    #[inline]
    pub fn cumulative_distance_meters(&self) -> f64 {
        self.cumulative_distance_meters
    }

    #[inline]
    pub fn last_accepted_coordinate(&self) -> Option<Coordinate> {
        self.last_accepted_coordinate
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.tail
            .last()
            .or_else(|| self.sealed.last().and_then(|chunk| chunk.last()))
    }

    /// Recompute the total distance from scratch by replaying the points in order
    ///
    /// Always equals [`Track::cumulative_distance_meters`]; useful for verification.
    pub fn replayed_distance(&self) -> f64 {
        self.segments()
            .map(|(a, b)| distance(a.coordinate, b.coordinate))
            .sum()
    }

    /// Consecutive point pairs, one per polyline segment
    pub fn segments(&self) -> impl Iterator<Item = (&TrackPoint, &TrackPoint)> + '_ {
        self.points().zip(self.points().skip(1))
    }

    /// Bounding box in degrees (x = longitude, y = latitude), `None` when empty
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let mut points = self.points();
        let first = points.next()?.coordinate;
        let (mut min, mut max) = (first, first);
        for point in points {
            let c = point.coordinate;
            min.latitude = min.latitude.min(c.latitude);
            min.longitude = min.longitude.min(c.longitude);
            max.latitude = max.latitude.max(c.latitude);
            max.longitude = max.longitude.max(c.longitude);
        }
        Some(Rect::new(min, max))
    }

    fn push(&mut self, point: TrackPoint) {
        let tail = Arc::make_mut(&mut self.tail);
        tail.push(point);
        if tail.len() == CHUNK_LEN {
            let full = std::mem::replace(tail, Vec::with_capacity(CHUNK_LEN));
            Arc::make_mut(&mut self.sealed).push(full.into());
        }
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct TrackRepr {
    points: Vec<TrackPoint>,
    cumulative_distance_meters: f64,
    last_accepted_coordinate: Option<Coordinate>,
}

#[cfg(feature = "serde")]
impl From<Track> for TrackRepr {
    fn from(track: Track) -> Self {
        Self {
            points: track.points().cloned().collect(),
            cumulative_distance_meters: track.cumulative_distance_meters,
            last_accepted_coordinate: track.last_accepted_coordinate,
        }
    }
}

#[cfg(feature = "serde")]
impl From<TrackRepr> for Track {
    fn from(repr: TrackRepr) -> Self {
        let mut track = Track {
            cumulative_distance_meters: repr.cumulative_distance_meters,
            last_accepted_coordinate: repr.last_accepted_coordinate,
            ..Default::default()
        };
        for point in repr.points {
            track.push(point);
        }
        track
    }
}

/// Result of applying one fix
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    /// The fix became a new track point; carries the updated track
    Accepted(Track),
    /// The fix was dropped; the track is unchanged
    Rejected { reason: RejectReason, track: Track },
}

impl FixOutcome {
    pub fn track(&self) -> &Track {
        match self {
            Self::Accepted(track) => track,
            Self::Rejected { track, .. } => track,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Sole writer of a session's [`Track`]
#[derive(Debug, Clone)]
pub struct TrackAccumulator {
    validator: FixValidator,
    track: Track,
    next_sequence: u64,
    accepted: u64,
    rejected: u64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackAccumulator {
    pub fn new(validator: FixValidator) -> Self {
        Self {
            validator,
            track: Track::default(),
            next_sequence: 1,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Validate `fix` and append it to the track if accepted
    ///
    /// Rejection is an expected outcome, not an error: the reason is returned and logged
    /// at debug level.
    pub fn apply_fix(&mut self, fix: &Fix) -> FixOutcome {
        #[cfg(feature = "profiling")]
        profiling::scope!("track::apply_fix");

        let last = self.track.last_accepted_coordinate;
        if let Validation::Reject(reason) = self.validator.validate(fix, last) {
            self.rejected += 1;
            tracing::debug!(
                %reason,
                latitude = fix.coordinate.latitude,
                longitude = fix.coordinate.longitude,
                accuracy = ?fix.accuracy_meters,
                "Rejected fix"
            );
            return FixOutcome::Rejected {
                reason,
                track: self.track.clone(),
            };
        }

        // First fix contributes nothing
        let step = last.map_or(0.0, |prev| distance(prev, fix.coordinate));

        self.track.push(TrackPoint {
            coordinate: fix.coordinate,
            sequence: self.next_sequence,
            accuracy_meters: fix.accuracy_meters,
            source: fix.source,
            timestamp: fix.timestamp,
        });
        self.next_sequence += 1;
        self.accepted += 1;
        self.track.cumulative_distance_meters += step;
        self.track.last_accepted_coordinate = Some(fix.coordinate);

        FixOutcome::Accepted(self.track.clone())
    }

    /// Current track (cheap clone)
    #[inline]
    pub fn track(&self) -> Track {
        self.track.clone()
    }

    #[inline]
    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    #[inline]
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackingConfig;

    fn fix(lat: f64, lon: f64) -> Fix {
        Fix::new(Coordinate::new(lat, lon), Capability::Foreground)
    }

    fn create_test_fixes() -> Vec<Fix> {
        // A short walk around London with one duplicate and one bad fix mixed in
        vec![
            fix(51.5074, -0.1278),
            fix(51.5076, -0.1276),
            fix(51.5076, -0.1276),
            fix(95.0, -0.1276),
            fix(51.5078, -0.1274),
            fix(51.5081, -0.1270).with_accuracy(10.0),
        ]
    }

    #[test]
    fn test_reference_walk() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        acc.apply_fix(&fix(0.0, 0.0));
        acc.apply_fix(&fix(0.0, 0.001));
        let outcome = acc.apply_fix(&fix(0.0, 0.001));

        assert_eq!(
            outcome,
            FixOutcome::Rejected {
                reason: RejectReason::DuplicatePosition,
                track: acc.track(),
            }
        );
        let track = acc.track();
        assert_eq!(track.len(), 2);
        assert!((track.cumulative_distance_meters() - 111.19).abs() < 0.5);
    }

    #[test]
    fn test_first_fix_contributes_zero() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        let outcome = acc.apply_fix(&fix(10.0, 10.0));
        assert!(outcome.is_accepted());
        assert_eq!(outcome.track().cumulative_distance_meters(), 0.0);
        assert_eq!(outcome.track().get(0).unwrap().sequence, 1);
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        for f in create_test_fixes() {
            acc.apply_fix(&f);
        }
        let track = acc.track();
        let sequences: Vec<u64> = track.points().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(acc.accepted_count(), 4);
        assert_eq!(acc.rejected_count(), 2);
    }

    #[test]
    fn test_distance_matches_replay_and_is_monotonic() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        let mut previous = 0.0;
        for f in create_test_fixes() {
            let outcome = acc.apply_fix(&f);
            let current = outcome.track().cumulative_distance_meters();
            assert!(current >= previous);
            previous = current;
        }
        let track = acc.track();
        assert!((track.cumulative_distance_meters() - track.replayed_distance()).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_fix_leaves_track_unchanged() {
        let mut acc = TrackAccumulator::new(FixValidator::new(&TrackingConfig {
            max_accuracy_meters: Some(30.0),
            ..Default::default()
        }));
        acc.apply_fix(&fix(0.0, 0.0));
        let before = acc.track();

        let outcome = acc.apply_fix(&fix(0.0, 0.01).with_accuracy(45.0));
        assert!(matches!(
            outcome,
            FixOutcome::Rejected {
                reason: RejectReason::LowAccuracy,
                ..
            }
        ));
        assert_eq!(acc.track(), before);
        assert_eq!(
            acc.track().last_accepted_coordinate(),
            Some(Coordinate::new(0.0, 0.0))
        );
    }

    #[test]
    fn test_determinism() {
        let fixes = create_test_fixes();
        let mut a = TrackAccumulator::new(FixValidator::default());
        let mut b = TrackAccumulator::new(FixValidator::default());
        for f in &fixes {
            a.apply_fix(f);
            b.apply_fix(f);
        }
        assert_eq!(a.track(), b.track());
    }

    #[test]
    fn test_clones_are_not_mutated() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        acc.apply_fix(&fix(0.0, 0.0));
        let held = acc.track();
        acc.apply_fix(&fix(0.0, 0.001));
        assert_eq!(held.len(), 1);
        assert_eq!(held.cumulative_distance_meters(), 0.0);
        assert_eq!(acc.track().len(), 2);
    }

    #[test]
    fn test_clones_survive_chunk_boundaries() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        let mut held = Vec::new();
        for i in 0..(CHUNK_LEN * 3 + 5) {
            acc.apply_fix(&fix(0.0, i as f64 * 0.0001));
            held.push(acc.track());
        }
        for (i, track) in held.iter().enumerate() {
            assert_eq!(track.len(), i + 1);
            assert_eq!(track.points().count(), i + 1);
            assert_eq!(track.last_point().map(|p| p.sequence), Some(i as u64 + 1));
        }
        let track = acc.track();
        assert_eq!(track.get(CHUNK_LEN).map(|p| p.sequence), Some(CHUNK_LEN as u64 + 1));
        assert_eq!(track.get(CHUNK_LEN * 3 + 4).map(|p| p.sequence), Some(CHUNK_LEN as u64 * 3 + 5));
        assert!(track.get(CHUNK_LEN * 3 + 5).is_none());
        assert_eq!(track.segments().count(), CHUNK_LEN * 3 + 4);
        assert!((track.cumulative_distance_meters() - track.replayed_distance()).abs() < 1e-6);
    }

    #[test]
    fn test_segments_and_bounds() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        assert!(acc.track().bounds().is_none());
        for f in create_test_fixes() {
            acc.apply_fix(&f);
        }
        let track = acc.track();
        assert_eq!(track.segments().count(), 3);

        let bounds = track.bounds().unwrap();
        assert!((bounds.min().y - 51.5074).abs() < 1e-9);
        assert!((bounds.max().y - 51.5081).abs() < 1e-9);
        assert!((bounds.min().x - -0.1278).abs() < 1e-9);
        assert!((bounds.max().x - -0.1270).abs() < 1e-9);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serializes_as_flat_point_list() {
        let mut acc = TrackAccumulator::new(FixValidator::default());
        for i in 0..(CHUNK_LEN + 3) {
            acc.apply_fix(&fix(0.0, i as f64 * 0.0001));
        }
        let track = acc.track();

        let json = serde_json::to_value(&track).unwrap();
        let points = json["points"].as_array().unwrap();
        assert_eq!(points.len(), CHUNK_LEN + 3);
        assert_eq!(points[CHUNK_LEN]["sequence"], CHUNK_LEN as u64 + 1);
        assert!(json.get("sealed").is_none());
        assert!(json.get("tail").is_none());

        let restored: Track = serde_json::from_value(json).unwrap();
        assert_eq!(restored, track);
        assert_eq!(restored.get(CHUNK_LEN), track.get(CHUNK_LEN));
        assert_eq!(
            restored.cumulative_distance_meters(),
            track.cumulative_distance_meters()
        );
    }
}
