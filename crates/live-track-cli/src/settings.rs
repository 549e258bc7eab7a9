use clap::Parser;
use live_track_lib::{Coordinate, DeliveryPolicy, TrackingConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Live Track - record a live track from a simulated walk or a replayed GPX file
pub struct Settings {
    /// Replay this GPX file instead of simulating a walk
    #[clap(short, long, value_name = "FILE")]
    pub gpx: Option<PathBuf>,

    /// Reject fixes less accurate than this many meters
    #[clap(long, value_name = "METERS")]
    pub max_accuracy: Option<f64>,

    /// Ignore movements shorter than this many meters
    #[clap(long, default_value = "0.0", value_name = "METERS")]
    pub min_displacement: f64,

    /// Delay between foreground fixes
    #[clap(long, default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Delay between fixes while backgrounded
    #[clap(long, default_value = "5000")]
    pub background_interval_ms: u64,

    /// Stop after this many seconds (default: until Ctrl-C or the session ends)
    #[clap(short, long)]
    pub duration_secs: Option<u64>,

    /// Starting latitude of the simulated walk
    #[clap(long, default_value = "51.5074", allow_negative_numbers = true)]
    pub latitude: f64,

    /// Starting longitude of the simulated walk
    #[clap(long, default_value = "-0.1278", allow_negative_numbers = true)]
    pub longitude: f64,

    /// Seed for the simulated walk
    #[clap(long, default_value = "1")]
    pub seed: u64,

    /// Simulate backgrounding the app after this many foreground fixes
    #[clap(long, value_name = "FIXES")]
    pub background_after: Option<usize>,

    /// Return to the foreground after this many background fixes
    #[clap(long, value_name = "FIXES")]
    pub foreground_after: Option<usize>,

    /// Grant location access without asking
    #[clap(short, long, default_value = "false")]
    pub yes: bool,

    /// Keep at most this many undelivered snapshots, dropping the oldest
    #[clap(long, value_name = "CAPACITY")]
    pub drop_oldest: Option<usize>,
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig {
            max_accuracy_meters: self.max_accuracy,
            min_displacement_meters: self.min_displacement,
            poll_interval_ms: self.poll_interval_ms,
            background_interval_ms: self.background_interval_ms,
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        match self.drop_oldest {
            Some(capacity) => DeliveryPolicy::DropOldest { capacity },
            None => DeliveryPolicy::Buffered,
        }
    }

    pub fn origin(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library_config() {
        let settings = Settings::try_parse_from(["live-track"]).unwrap();
        assert_eq!(settings.tracking_config(), TrackingConfig::default());
        assert_eq!(settings.delivery_policy(), DeliveryPolicy::Buffered);
        assert!(settings.gpx.is_none());
        assert!(settings.duration().is_none());
    }

    #[test]
    fn test_flags_map_onto_config() {
        let settings = Settings::try_parse_from([
            "live-track",
            "--max-accuracy",
            "30",
            "--min-displacement",
            "2.5",
            "--poll-interval-ms",
            "500",
            "--drop-oldest",
            "4",
            "--longitude",
            "-3.7",
            "--yes",
        ])
        .unwrap();
        let config = settings.tracking_config();
        assert_eq!(config.max_accuracy_meters, Some(30.0));
        assert_eq!(config.min_displacement_meters, 2.5);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(
            settings.delivery_policy(),
            DeliveryPolicy::DropOldest { capacity: 4 }
        );
        assert_eq!(settings.origin().longitude, -3.7);
        assert!(settings.yes);
    }
}
