pub mod connstr;
pub mod error;
pub mod link;
pub mod listener;
pub mod modes;
pub mod params;
pub mod session;
pub mod state;
pub mod transport;

pub use error::FcError;
pub use session::Session;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcConfig {
    /// MAVLink ids we use (ground station side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// GCS heartbeat send rate.
    pub heartbeat_hz: f32,

    /// REQUEST_DATA_STREAM rate for all streams, 0 disables the request.
    pub stream_rate_hz: u16,

    /// Interval of every "wait until" poll loop.
    pub poll_interval_ms: u64,

    /// Upper bound on wait loops. None waits until the condition holds.
    pub wait_timeout_s: Option<u64>,

    /// Arming also requires a 2D or better GPS fix.
    pub require_gps_fix: bool,

    pub param_timeout_ms: u64,
    pub param_retry_ms: u64,
    /// Pause around each parameter read/write step.
    pub param_settle_ms: u64,
}

impl Default for FcConfig {
    fn default() -> Self {
        Self {
            sys_id: 255,
            comp_id: 190,
            target_sys: 1,
            target_comp: 1,
            heartbeat_hz: 1.0,
            stream_rate_hz: 4,
            poll_interval_ms: 1000,
            wait_timeout_s: None,
            require_gps_fix: true,
            param_timeout_ms: 5000,
            param_retry_ms: 1000,
            param_settle_ms: 100,
        }
    }
}

impl FcConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_s.map(Duration::from_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.heartbeat_hz.max(0.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: FcConfig = toml::from_str("target_sys = 2\npoll_interval_ms = 250\n").unwrap();
        assert_eq!(cfg.target_sys, 2);
        assert_eq!(cfg.target_comp, 1);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert!(cfg.wait_timeout().is_none());
    }

    #[test]
    fn heartbeat_rate_is_floored() {
        let cfg = FcConfig { heartbeat_hz: 0.0, ..FcConfig::default() };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(5));
    }
}
