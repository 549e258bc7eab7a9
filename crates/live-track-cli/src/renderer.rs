use live_track_lib::{AccuracyClass, SessionState, Snapshot, TrackPoint, format_distance_km};

/// Prints session changes and newly accepted points to stdout
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    last_state: Option<SessionState>,
    points_shown: usize,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &Snapshot) {
        for line in self.lines(snapshot) {
            println!("{line}");
        }
    }

    /// Lines describing what changed since the previous snapshot
    fn lines(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.last_state != Some(snapshot.state) {
            self.last_state = Some(snapshot.state);
            lines.push(format!("== {} ==", state_banner(snapshot)));
        }

        let track = &snapshot.track;
        if track.len() > self.points_shown {
            for point in track.points().skip(self.points_shown) {
                lines.push(point_line(point));
            }
            self.points_shown = track.len();
            lines.push(format!(
                "   {} points, {}",
                track.len(),
                snapshot.distance_label()
            ));
            let region = snapshot.map_region();
            tracing::trace!(
                center = ?region.center,
                delta = region.latitude_delta,
                "Map region"
            );
        }

        lines
    }
}

fn state_banner(snapshot: &Snapshot) -> String {
    match snapshot.state {
        SessionState::AwaitingPermission => "Waiting for location permission".to_string(),
        SessionState::Active => "Tracking".to_string(),
        SessionState::Backgrounded => "Tracking in the background".to_string(),
        SessionState::Stopped => format!("Stopped after {}", snapshot.distance_label()),
        state => format!("Session {state}"),
    }
}

fn point_line(point: &TrackPoint) -> String {
    let accuracy = match point.accuracy_meters {
        Some(meters) => format!("±{meters:.0} m"),
        None => "±? m".to_string(),
    };
    let class = match AccuracyClass::of(point) {
        AccuracyClass::Precise => "precise",
        AccuracyClass::Coarse => "coarse",
    };
    format!(
        "#{:<5} {:>10.6}, {:>11.6}  {accuracy} ({class}, {})",
        point.sequence, point.coordinate.latitude, point.coordinate.longitude, point.source
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_track_lib::{
        Capability, Coordinate, ErrorKind, Fix, FixValidator, TrackAccumulator,
    };

    fn snapshot_with(fixes: &[Fix], state: SessionState, revision: u64) -> Snapshot {
        let mut accumulator = TrackAccumulator::new(FixValidator::default());
        for fix in fixes {
            accumulator.apply_fix(fix);
        }
        Snapshot {
            track: accumulator.track(),
            state,
            is_tracking: state.is_tracking(),
            last_error: None,
            revision,
        }
    }

    fn fix(lat: f64, lon: f64) -> Fix {
        Fix::new(Coordinate::new(lat, lon), Capability::Foreground).with_accuracy(8.0)
    }

    #[test]
    fn test_only_new_points_are_printed() {
        let mut renderer = ConsoleRenderer::new();
        let first = snapshot_with(&[fix(0.0, 0.0)], SessionState::Active, 1);
        let lines = renderer.lines(&first);
        assert_eq!(lines[0], "== Tracking ==");
        assert!(lines[1].starts_with("#1"));
        assert!(lines[1].contains("precise"));
        assert_eq!(lines.len(), 3);

        let second = snapshot_with(&[fix(0.0, 0.0), fix(0.0, 0.001)], SessionState::Active, 2);
        let lines = renderer.lines(&second);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("#2"));
        assert_eq!(lines[1], "   2 points, 0.11 km");
    }

    #[test]
    fn test_state_changes_are_announced_once() {
        let mut renderer = ConsoleRenderer::new();
        let mut failed = snapshot_with(&[], SessionState::Failed(ErrorKind::ProviderError), 1);
        failed.last_error = Some(ErrorKind::ProviderError);
        assert_eq!(
            renderer.lines(&failed),
            vec!["== Session failed (provider error) ==".to_string()]
        );
        assert!(renderer.lines(&failed).is_empty());
    }
}
