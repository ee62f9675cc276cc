//! Scripted ArduCopter stand-in for mission tests, driven through the mock
//! transport's reply hook.

use mavlink::common::{
    GpsFixType, MavCmd, MavMessage, MavParamType, GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA,
    NAV_CONTROLLER_OUTPUT_DATA, PARAM_VALUE_DATA,
};
use mf_fc::params::{decode_param_id, encode_param_id, servo_function_param, servo_reversed_param};
use mf_fc::transport::mock::{autopilot_heartbeat, MockTransport};
use mf_fc::FcConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct Copter {
    pub armed: bool,
    pub mode: u32,
    pub alt_m: f32,
    pub params: HashMap<String, f32>,
    pub servo: Vec<(u8, u16)>,
    pub ticks: u32,
}

pub fn fast_cfg() -> FcConfig {
    FcConfig {
        heartbeat_hz: 50.0,
        poll_interval_ms: 5,
        wait_timeout_s: Some(5),
        stream_rate_hz: 0,
        param_timeout_ms: 500,
        param_retry_ms: 50,
        param_settle_ms: 1,
        ..FcConfig::default()
    }
}

/// Hexa with its motors on SERVO1..6 already swapped around, so a reset has work to do.
pub fn hexa(mock: &MockTransport) -> Arc<Mutex<Copter>> {
    let mut params = HashMap::new();
    for n in 1..=6u8 {
        params.insert(servo_function_param(n), 0.0);
        params.insert(servo_reversed_param(n), 1.0);
    }
    let copter = Arc::new(Mutex::new(Copter { params, ..Copter::default() }));
    let c = copter.clone();
    mock.set_reply(move |msg| c.lock().unwrap().handle(msg));
    mock.push_inbound(autopilot_heartbeat(false, 0));
    copter
}

impl Copter {
    fn handle(&mut self, msg: &MavMessage) -> Vec<MavMessage> {
        match msg {
            MavMessage::HEARTBEAT(_) => {
                self.ticks += 1;
                vec![
                    gps_fix(),
                    self.position(),
                    nav(self.ticks as f32, -(self.ticks as f32)),
                    autopilot_heartbeat(self.armed, self.mode),
                ]
            }
            MavMessage::COMMAND_LONG(c) => match c.command {
                MavCmd::MAV_CMD_DO_SET_MODE => {
                    self.mode = c.param2 as u32;
                    vec![autopilot_heartbeat(self.armed, self.mode)]
                }
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM => {
                    self.armed = c.param1 == 1.0;
                    vec![autopilot_heartbeat(self.armed, self.mode)]
                }
                MavCmd::MAV_CMD_NAV_TAKEOFF if self.armed => {
                    self.alt_m = c.param7;
                    vec![self.position()]
                }
                MavCmd::MAV_CMD_DO_SET_SERVO => {
                    self.servo.push((c.param1 as u8, c.param2 as u16));
                    Vec::new()
                }
                _ => Vec::new(),
            },
            MavMessage::PARAM_REQUEST_READ(r) => {
                let name = decode_param_id(&r.param_id);
                self.params.get(&name).map(|v| vec![param_value(&name, *v)]).unwrap_or_default()
            }
            MavMessage::PARAM_SET(s) => {
                let name = decode_param_id(&s.param_id);
                self.params.insert(name.clone(), s.param_value);
                vec![param_value(&name, s.param_value)]
            }
            _ => Vec::new(),
        }
    }

    fn position(&self) -> MavMessage {
        MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            time_boot_ms: self.ticks * 20,
            lat: -353_632_610,
            lon: 1_491_652_300,
            alt: 584_000 + (self.alt_m * 1000.0) as i32,
            relative_alt: (self.alt_m * 1000.0) as i32,
            vx: 0,
            vy: 0,
            vz: 0,
            hdg: 0,
        })
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params.get(name).copied()
    }
}

fn gps_fix() -> MavMessage {
    MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
        time_usec: 0,
        lat: -353_632_610,
        lon: 1_491_652_300,
        alt: 584_000,
        eph: 121,
        epv: 200,
        vel: 0,
        cog: 0,
        fix_type: GpsFixType::GPS_FIX_TYPE_3D_FIX,
        satellites_visible: 10,
    })
}

fn nav(pitch: f32, roll: f32) -> MavMessage {
    MavMessage::NAV_CONTROLLER_OUTPUT(NAV_CONTROLLER_OUTPUT_DATA {
        nav_roll: roll,
        nav_pitch: pitch,
        alt_error: 0.0,
        aspd_error: 0.0,
        xtrack_error: 0.0,
        nav_bearing: 0,
        target_bearing: 0,
        wp_dist: 0,
    })
}

fn param_value(name: &str, value: f32) -> MavMessage {
    MavMessage::PARAM_VALUE(PARAM_VALUE_DATA {
        param_value: value,
        param_count: 12,
        param_index: 0,
        param_id: encode_param_id(name).unwrap_or_default(),
        param_type: MavParamType::MAV_PARAM_TYPE_INT8,
    })
}
