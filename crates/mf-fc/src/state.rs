use mavlink::{
    common::{
        GpsFixType, MavAutopilot, MavMessage, MavModeFlag, MavParamType, MavState, MavType, HEARTBEAT_DATA,
        NAV_CONTROLLER_OUTPUT_DATA, SYS_STATUS_DATA,
    },
    MavHeader,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::modes::copter_mode_name;
use crate::params::decode_param_id;

pub type SharedState = Arc<Mutex<VehicleState>>;

/// From SYS_STATUS; `None` where the autopilot reports the field as unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryStatus {
    pub volts: Option<f32>,
    pub amps: Option<f32>,
    pub percent: Option<u8>,
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.volts {
            Some(v) => write!(f, "{:.2}V", v)?,
            None => f.write_str("?V")?,
        }
        if let Some(a) = self.amps {
            write!(f, " {:.1}A", a)?;
        }
        if let Some(p) = self.percent {
            write!(f, " {}%", p)?;
        }
        Ok(())
    }
}

/// What we know about the vehicle, folded from inbound messages.
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    pub last_heartbeat: Option<(Instant, HEARTBEAT_DATA)>,
    pub autopilot_sys: Option<u8>,
    pub armed: bool,
    pub custom_mode: Option<u32>,
    pub system_status: Option<MavState>,
    pub gps_fix_ok: bool,
    pub relative_alt_m: Option<f32>,
    pub battery: BatteryStatus,
    pub nav: Option<NAV_CONTROLLER_OUTPUT_DATA>,
    pub params: HashMap<String, (f32, MavParamType)>,
    pub msg_count: u64,
    /// Only this system's messages are folded in, when set.
    pub target_sys: Option<u8>,
}

/// Heartbeat from a flight controller, as opposed to a GCS, gimbal, camera or
/// companion computer sharing the link.
pub fn is_vehicle_heartbeat(hb: &HEARTBEAT_DATA) -> bool {
    hb.mavtype != MavType::MAV_TYPE_GCS && hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
}

impl VehicleState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn shared_for(target_sys: u8) -> SharedState {
        Arc::new(Mutex::new(Self { target_sys: Some(target_sys), ..Self::default() }))
    }

    pub fn apply(&mut self, hdr: &MavHeader, msg: &MavMessage) {
        self.msg_count += 1;
        if self.target_sys.map_or(false, |t| t != hdr.system_id) {
            return;
        }
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                if !is_vehicle_heartbeat(hb) {
                    return;
                }
                self.autopilot_sys = Some(hdr.system_id);
                self.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                self.custom_mode = Some(hb.custom_mode);
                self.system_status = Some(hb.system_status);
                self.last_heartbeat = Some((Instant::now(), hb.clone()));
            }
            MavMessage::SYS_STATUS(status) => self.update_battery(status),
            MavMessage::GPS_RAW_INT(gps) => {
                self.gps_fix_ok = !matches!(
                    gps.fix_type,
                    GpsFixType::GPS_FIX_TYPE_NO_GPS | GpsFixType::GPS_FIX_TYPE_NO_FIX
                );
            }
            MavMessage::GLOBAL_POSITION_INT(pos) => {
                // relative_alt is in millimetres
                self.relative_alt_m = Some(pos.relative_alt as f32 / 1000.0);
            }
            MavMessage::NAV_CONTROLLER_OUTPUT(nav) => self.nav = Some(nav.clone()),
            MavMessage::PARAM_VALUE(p) => {
                self.params.insert(decode_param_id(&p.param_id), (p.param_value, p.param_type));
            }
            _ => {}
        }
    }

    fn update_battery(&mut self, status: &SYS_STATUS_DATA) {
        // mV, cA and percent; u16::MAX / -1 mean "not measured"
        self.battery = BatteryStatus {
            volts: (status.voltage_battery != u16::MAX).then(|| status.voltage_battery as f32 / 1000.0),
            amps: (status.current_battery >= 0).then(|| status.current_battery as f32 / 100.0),
            percent: u8::try_from(status.battery_remaining).ok().filter(|p| *p <= 100),
        };
    }

    pub fn heartbeat_seen(&self) -> bool {
        self.last_heartbeat.is_some()
    }

    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.as_ref().map(|(t, _)| t.elapsed())
    }

    pub fn mode_name(&self) -> Option<&'static str> {
        self.custom_mode.and_then(copter_mode_name)
    }

    /// Still booting or calibrating counts as "initialising".
    pub fn is_initialising(&self) -> bool {
        matches!(
            self.system_status,
            None | Some(MavState::MAV_STATE_UNINIT)
                | Some(MavState::MAV_STATE_BOOT)
                | Some(MavState::MAV_STATE_CALIBRATING)
        )
    }

    pub fn is_armable(&self, require_gps_fix: bool) -> bool {
        self.heartbeat_seen() && !self.is_initialising() && (!require_gps_fix || self.gps_fix_ok)
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params.get(name).map(|(v, _)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::encode_param_id;
    use crate::transport::mock::autopilot_heartbeat;
    use mavlink::common::{GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, PARAM_VALUE_DATA};

    const HDR: MavHeader = MavHeader { system_id: 1, component_id: 1, sequence: 0 };

    fn gps(fix_type: GpsFixType) -> MavMessage {
        MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
            time_usec: 0,
            lat: 0,
            lon: 0,
            alt: 0,
            eph: 0,
            epv: 0,
            vel: 0,
            cog: 0,
            fix_type,
            satellites_visible: 10,
        })
    }

    #[test]
    fn heartbeat_tracks_armed_and_mode() {
        let mut st = VehicleState::default();
        assert!(!st.heartbeat_seen());
        st.apply(&HDR, &autopilot_heartbeat(true, 4));
        assert!(st.armed);
        assert_eq!(st.mode_name(), Some("GUIDED"));
        assert!(st.hb_age().is_some_and(|age| age < Duration::from_secs(1)));
        assert_eq!(st.autopilot_sys, Some(1));
        st.apply(&HDR, &autopilot_heartbeat(false, 4));
        assert!(!st.armed);
    }

    #[test]
    fn armable_needs_fix_unless_waived() {
        let mut st = VehicleState::default();
        st.apply(&HDR, &autopilot_heartbeat(false, 0));
        assert!(!st.is_armable(true));
        assert!(st.is_armable(false));
        st.apply(&HDR, &gps(GpsFixType::GPS_FIX_TYPE_NO_FIX));
        assert!(!st.is_armable(true));
        st.apply(&HDR, &gps(GpsFixType::GPS_FIX_TYPE_3D_FIX));
        assert!(st.is_armable(true));
    }

    #[test]
    fn altitude_from_global_position() {
        let mut st = VehicleState::default();
        st.apply(&HDR, &MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 0,
            lat: 0,
            lon: 0,
            alt: 600_000,
            relative_alt: 9_600,
            vx: 0,
            vy: 0,
            vz: 0,
            hdg: 0,
        }));
        assert_eq!(st.relative_alt_m, Some(9.6));
    }

    #[test]
    fn param_values_are_cached_by_name() {
        let mut st = VehicleState::default();
        st.apply(&HDR, &MavMessage::PARAM_VALUE(PARAM_VALUE_DATA {
            param_value: 33.0,
            param_count: 1,
            param_index: 0,
            param_id: encode_param_id("SERVO1_FUNCTION").unwrap(),
            param_type: MavParamType::MAV_PARAM_TYPE_INT16,
        }));
        assert_eq!(st.param("SERVO1_FUNCTION"), Some(33.0));
        assert_eq!(st.param("SERVO2_FUNCTION"), None);
    }

    fn component_heartbeat(mavtype: MavType) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    #[test]
    fn gimbal_and_camera_heartbeats_do_not_disarm() {
        let mut st = VehicleState::default();
        st.apply(&HDR, &autopilot_heartbeat(true, 4));
        let gimbal_hdr = MavHeader { system_id: 1, component_id: 154, sequence: 0 };
        st.apply(&gimbal_hdr, &component_heartbeat(MavType::MAV_TYPE_GIMBAL));
        st.apply(&gimbal_hdr, &component_heartbeat(MavType::MAV_TYPE_CAMERA));
        assert!(st.armed);
        assert_eq!(st.custom_mode, Some(4));
        assert_eq!(st.system_status, Some(MavState::MAV_STATE_STANDBY));
    }

    #[test]
    fn other_systems_are_ignored_when_targeted() {
        let mut st = VehicleState { target_sys: Some(1), ..VehicleState::default() };
        st.apply(&HDR, &autopilot_heartbeat(true, 4));
        let other = MavHeader { system_id: 2, component_id: 1, sequence: 0 };
        st.apply(&other, &autopilot_heartbeat(false, 0));
        assert!(st.armed);
        assert_eq!(st.autopilot_sys, Some(1));
    }

    #[test]
    fn battery_from_sys_status() {
        let mut st = VehicleState::default();
        st.apply(&HDR, &MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            voltage_battery: 12_600,
            current_battery: -1,
            battery_remaining: 87,
            ..Default::default()
        }));
        assert_eq!(st.battery, BatteryStatus { volts: Some(12.6), amps: None, percent: Some(87) });
        assert_eq!(st.battery.to_string(), "12.60V 87%");
    }
}
