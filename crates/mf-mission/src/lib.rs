pub mod fault;
pub mod mission;

#[cfg(test)]
mod sim;

use mf_fc::link::Waypoint;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// ArduCopter mode to arm in. Copter arms and takes off in GUIDED.
    pub mode: String,
    pub takeoff_alt_m: f32,
    /// Takeoff counts as done at this fraction of the target altitude.
    pub alt_reached_ratio: f32,
    pub airspeed_ms: f32,
    pub waypoint: Waypoint,
    /// Time given to the goto before anything else happens.
    pub approach_s: f64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            mode: "GUIDED".into(),
            takeoff_alt_m: 10.0,
            alt_reached_ratio: 0.95,
            airspeed_ms: 3.0,
            waypoint: Waypoint { lat: -35.361354, lon: 149.165218, alt_m: 20.0 },
            approach_s: 5.0,
        }
    }
}

impl MissionConfig {
    pub fn approach(&self) -> Duration {
        secs(self.approach_s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Motor outputs on the frame (hexa: 6). Reset covers SERVO1..SERVOn.
    pub frame_motors: u8,
    /// Outputs to kill.
    pub fault_motors: Vec<u8>,
    /// 1000us keeps a motor from spinning at all.
    pub fault_pwm: u16,
    /// SERVOn_FUNCTION for outputs under manual control (1 = RCPassThru).
    pub passthrough_function: u16,
    /// How long to watch the vehicle after the fault.
    pub hold_s: f64,
    pub yaw_motors: Vec<u8>,
    pub yaw_pwm: u16,
    pub yaw_hold_s: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            frame_motors: 6,
            fault_motors: vec![1, 2],
            fault_pwm: 1000,
            passthrough_function: 1,
            hold_s: 10.0,
            yaw_motors: vec![3, 4, 5, 6],
            yaw_pwm: 1800,
            yaw_hold_s: 10.0,
        }
    }
}

impl FaultConfig {
    pub fn hold(&self) -> Duration {
        secs(self.hold_s)
    }

    pub fn yaw_hold(&self) -> Duration {
        secs(self.yaw_hold_s)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!((1..=16).contains(&self.frame_motors), "fault.frame_motors must be 1..16");
        for m in self.fault_motors.iter().chain(&self.yaw_motors) {
            anyhow::ensure!(*m >= 1 && *m <= self.frame_motors, "motor {} outside 1..{}", m, self.frame_motors);
        }
        anyhow::ensure!((800..=2200).contains(&self.fault_pwm), "fault.fault_pwm out of range");
        anyhow::ensure!((800..=2200).contains(&self.yaw_pwm), "fault.yaw_pwm out of range");
        Ok(())
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_hexa_experiment() {
        let f = FaultConfig::default();
        f.validate().unwrap();
        assert_eq!(f.fault_motors, vec![1, 2]);
        assert_eq!(f.hold(), Duration::from_secs(10));
        let m = MissionConfig::default();
        assert_eq!(m.waypoint.alt_m, 20.0);
        assert_eq!(m.approach(), Duration::from_secs(5));
    }

    #[test]
    fn motors_must_exist_on_the_frame() {
        let quad = FaultConfig { frame_motors: 4, ..FaultConfig::default() };
        assert!(quad.validate().is_err());
        let quad = FaultConfig { frame_motors: 4, yaw_motors: vec![3, 4], ..FaultConfig::default() };
        quad.validate().unwrap();
        let bad_pwm = FaultConfig { fault_pwm: 50, ..FaultConfig::default() };
        assert!(bad_pwm.validate().is_err());
    }
}
