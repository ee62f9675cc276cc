use anyhow::Result;
use mavlink::{
    common::{
        MavMessage, HEARTBEAT_DATA, MavAutopilot, MavModeFlag, MavState, MavType,
        COMMAND_LONG_DATA, MavCmd, MavFrame, MISSION_ITEM_INT_DATA, PARAM_REQUEST_READ_DATA,
        PARAM_SET_DATA, MavParamType, PositionTargetTypemask, REQUEST_DATA_STREAM_DATA,
        SET_POSITION_TARGET_LOCAL_NED_DATA,
    },
    MavHeader,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::modes::copter_mode_number;
use crate::params::encode_param_id;
use crate::transport::MavTransport;
use crate::FcConfig;

/// Only the velocity fields of SET_POSITION_TARGET_LOCAL_NED are used.
pub const VELOCITY_ONLY_TYPE_MASK: u16 = 0b0000_1111_1100_0111;

/// Global-relative target for a guided goto.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
}

/// Degrees to the 1e-7 degree integers MAVLink uses for positions.
fn degrees_e7(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}

/// Outbound half of the FC connection: encodes commands and stamps headers.
pub struct FcLink {
    transport: Arc<dyn MavTransport>,
    sys_id: u8,
    comp_id: u8,
    seq: AtomicU8,
    target_sys: u8,
    target_comp: u8,
}

impl FcLink {
    pub fn new(transport: Arc<dyn MavTransport>, cfg: &FcConfig) -> Self {
        Self {
            transport,
            sys_id: cfg.sys_id,
            comp_id: cfg.comp_id,
            seq: AtomicU8::new(0),
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
        }
    }

    pub fn transport(&self) -> &Arc<dyn MavTransport> {
        &self.transport
    }

    pub fn target(&self) -> (u8, u8) {
        (self.target_sys, self.target_comp)
    }

    pub fn send(&self, msg: MavMessage) -> Result<()> {
        let hdr = MavHeader {
            system_id: self.sys_id,
            component_id: self.comp_id,
            sequence: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.transport.send(&hdr, &msg)
    }

    pub fn send_heartbeat(&self) -> Result<()> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }

    /// Ask for every data stream at `rate_hz` (ArduPilot streams nothing to a new GCS otherwise).
    pub fn request_data_streams(&self, rate_hz: u16) -> Result<()> {
        debug!("FC: requesting all data streams at {}Hz", rate_hz);
        self.send(MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate_hz,
            target_system: self.target_sys,
            target_component: self.target_comp,
            req_stream_id: 0,
            start_stop: 1,
        }))
    }

    pub fn command_long(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn arm(&self) -> Result<()> {
        info!("FC: sending ARM");
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn disarm(&self) -> Result<()> {
        info!("FC: sending DISARM");
        self.command_long(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7])
    }

    pub fn set_mode(&self, mode: &str) -> Result<()> {
        let custom = copter_mode_number(mode)?;
        info!("FC: setting mode {} ({})", mode, custom);
        let custom_enabled = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command_long(MavCmd::MAV_CMD_DO_SET_MODE, [custom_enabled, custom as f32, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn takeoff(&self, alt_m: f32) -> Result<()> {
        info!("FC: takeoff to {}m", alt_m);
        self.command_long(MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, alt_m])
    }

    /// Default/target airspeed for subsequent gotos.
    pub fn set_airspeed(&self, speed_ms: f32) -> Result<()> {
        debug!("FC: airspeed {}m/s", speed_ms);
        self.command_long(MavCmd::MAV_CMD_DO_CHANGE_SPEED, [0.0, speed_ms, -1.0, 0.0, 0.0, 0.0, 0.0])
    }

    /// Force a PWM value on a servo output channel (1-based).
    pub fn set_servo(&self, channel: u8, pwm: u16) -> Result<()> {
        info!("FC: servo {} -> {}us", channel, pwm);
        self.command_long(MavCmd::MAV_CMD_DO_SET_SERVO, [channel as f32, pwm as f32, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    /// Guided-mode goto: a MISSION_ITEM_INT with current=2 is taken as an immediate target.
    pub fn goto(&self, wp: Waypoint) -> Result<()> {
        info!("FC: goto lat={} lon={} alt={}m", wp.lat, wp.lon, wp.alt_m);
        self.send(MavMessage::MISSION_ITEM_INT(MISSION_ITEM_INT_DATA {
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: degrees_e7(wp.lat),
            y: degrees_e7(wp.lon),
            z: wp.alt_m,
            seq: 0,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            target_system: self.target_sys,
            target_component: self.target_comp,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            current: 2,
            autocontinue: 0,
        }))
    }

    pub fn send_ned_velocity(&self, vx: f32, vy: f32, vz: f32) -> Result<()> {
        self.send(MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vx,
            vy,
            vz,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw: 0.0,
            yaw_rate: 0.0,
            type_mask: PositionTargetTypemask::from_bits_truncate(VELOCITY_ONLY_TYPE_MASK),
            target_system: self.target_sys,
            target_component: self.target_comp,
            coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        }))
    }

    pub fn param_set(&self, name: &str, value: f32, param_type: MavParamType) -> Result<()> {
        self.send(MavMessage::PARAM_SET(PARAM_SET_DATA {
            param_value: value,
            target_system: self.target_sys,
            target_component: self.target_comp,
            param_id: encode_param_id(name)?,
            param_type,
        }))
    }

    pub fn param_request_read(&self, name: &str) -> Result<()> {
        self.send(MavMessage::PARAM_REQUEST_READ(PARAM_REQUEST_READ_DATA {
            param_index: -1,
            target_system: self.target_sys,
            target_component: self.target_comp,
            param_id: encode_param_id(name)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn link() -> (Arc<MockTransport>, FcLink) {
        let mock = Arc::new(MockTransport::new());
        let link = FcLink::new(mock.clone(), &FcConfig::default());
        (mock, link)
    }

    #[test]
    fn servo_override_is_a_command_long() {
        let (mock, link) = link();
        link.set_servo(2, 1000).unwrap();
        match &mock.sent()[0] {
            MavMessage::COMMAND_LONG(c) => {
                assert_eq!(c.command, MavCmd::MAV_CMD_DO_SET_SERVO);
                assert_eq!(c.param1, 2.0);
                assert_eq!(c.param2, 1000.0);
                assert_eq!((c.target_system, c.target_component), (1, 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mode_change_uses_copter_numbers() {
        let (mock, link) = link();
        link.set_mode("GUIDED").unwrap();
        assert!(link.set_mode("MANUAL").is_err());
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            MavMessage::COMMAND_LONG(c) => {
                assert_eq!(c.command, MavCmd::MAV_CMD_DO_SET_MODE);
                assert_eq!(c.param2, 4.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn goto_is_a_guided_mission_item() {
        let (mock, link) = link();
        link.goto(Waypoint { lat: -35.361354, lon: 149.165218, alt_m: 20.0 }).unwrap();
        match &mock.sent()[0] {
            MavMessage::MISSION_ITEM_INT(m) => {
                assert_eq!(m.current, 2);
                assert_eq!(m.frame, MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT);
                assert_eq!((m.x, m.y), (-353_613_540, 1_491_652_180));
                assert_eq!(m.z, 20.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn velocity_setpoint_masks_position_and_accel() {
        let (mock, link) = link();
        link.send_ned_velocity(1.0, 0.0, -0.5).unwrap();
        match &mock.sent()[0] {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(p) => {
                assert_eq!(p.type_mask.bits(), VELOCITY_ONLY_TYPE_MASK);
                assert_eq!(p.vz, -0.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sends_fail_after_close() {
        let (mock, link) = link();
        mock.close();
        assert!(link.disarm().is_err());
    }
}
