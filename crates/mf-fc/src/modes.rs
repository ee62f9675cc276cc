//! ArduCopter custom flight modes (HEARTBEAT.custom_mode).

use anyhow::Result;

use crate::error::FcError;

const COPTER_MODES: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("LAND", 9),
    ("DRIFT", 11),
    ("SPORT", 13),
    ("FLIP", 14),
    ("AUTOTUNE", 15),
    ("POSHOLD", 16),
    ("BRAKE", 17),
    ("THROW", 18),
    ("AVOID_ADSB", 19),
    ("GUIDED_NOGPS", 20),
    ("SMART_RTL", 21),
];

pub fn copter_mode_number(name: &str) -> Result<u32> {
    let upper = name.trim().to_ascii_uppercase();
    COPTER_MODES
        .iter()
        .find(|(n, _)| *n == upper)
        .map(|(_, v)| *v)
        .ok_or_else(|| FcError::UnknownMode(name.to_string()).into())
}

pub fn copter_mode_name(custom_mode: u32) -> Option<&'static str> {
    COPTER_MODES.iter().find(|(_, v)| *v == custom_mode).map(|(n, _)| *n)
}
