use mavlink::common::NAV_CONTROLLER_OUTPUT_DATA;
use serde::{Deserialize, Serialize};

/// One NAV_CONTROLLER_OUTPUT reading, taken when a heartbeat arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavSample {
    /// Milliseconds since the recorder started.
    pub t_ms: u64,
    pub pitch: f32,           // deg
    pub roll: f32,            // deg
    pub alt_error: f32,       // m
    pub aspd_error: f32,      // m/s
    pub xtrack_error: f32,    // m
    pub nav_bearing: i16,     // deg
    pub target_bearing: i16,  // deg
    pub wp_dist: u16,         // m
}

impl NavSample {
    pub fn from_nav(t_ms: u64, nav: &NAV_CONTROLLER_OUTPUT_DATA) -> Self {
        Self {
            t_ms,
            pitch: nav.nav_pitch,
            roll: nav.nav_roll,
            alt_error: nav.alt_error,
            aspd_error: nav.aspd_error,
            xtrack_error: nav.xtrack_error,
            nav_bearing: nav.nav_bearing,
            target_bearing: nav.target_bearing,
            wp_dist: nav.wp_dist,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryLog {
    pub started_unix_ms: i64,
    pub samples: Vec<NavSample>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self {
            started_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, s: NavSample) {
        self.samples.push(s);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn pitch(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.pitch as f64).collect()
    }

    pub fn roll(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.roll as f64).collect()
    }
}
