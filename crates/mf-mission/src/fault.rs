//! Motor fault experiments.
//!
//! ArduCopter drives motor N through SERVO<N>_FUNCTION = 32 + N. Handing an
//! output over to RC passthrough (function 1) and forcing a PWM on it with
//! DO_SET_SERVO takes that motor out of the mixer, which is the fault.

use anyhow::Result;
use mf_fc::Session;
use mf_telemetry::{Recorder, TelemetryLog};
use std::path::Path;
use tracing::{error, info, warn};

use crate::mission::fly_to_waypoint;
use crate::{FaultConfig, MissionConfig};

/// SERVOn_FUNCTION value that makes output `motor` drive MotorN.
pub fn motor_function(motor: u8) -> u16 {
    32 + motor as u16
}

/// Restore SERVO1..n to Motor1..n, unreversed.
pub async fn reset_motors(session: &Session, frame_motors: u8) -> Result<()> {
    info!("Resetting SERVO1..{} to default motor functions", frame_motors);
    for n in 1..=frame_motors {
        session.set_motor_function(n, motor_function(n)).await?;
    }
    for n in 1..=frame_motors {
        session.set_motor_reversed(n, false).await?;
    }
    Ok(())
}

/// Take `motors` out of the mixer and pin them at `pwm`.
pub async fn override_motors(session: &Session, motors: &[u8], function: u16, pwm: u16) -> Result<()> {
    for &m in motors {
        session.set_motor_function(m, function).await?;
    }
    for &m in motors {
        session.link().set_servo(m, pwm)?;
    }
    Ok(())
}

/// Fly out and force the fault PWM on the fault motors, then watch for `hold`.
pub async fn servo_fault(session: &mut Session, mission: &MissionConfig, fault: &FaultConfig) -> Result<()> {
    fly_to_waypoint(session, mission).await?;

    warn!("Injecting fault: motors {:?} -> {}us", fault.fault_motors, fault.fault_pwm);
    for &m in &fault.fault_motors {
        session.link().set_servo(m, fault.fault_pwm)?;
    }
    tokio::time::sleep(fault.hold()).await;
    Ok(())
}

/// Reset the frame, record pitch/roll for the whole flight, inject the fault
/// and write the recording to `output`.
///
/// The recording is saved even when the flight fails part way through.
pub async fn trajectory_fault(
    session: &mut Session,
    mission: &MissionConfig,
    fault: &FaultConfig,
    output: &Path,
) -> Result<TelemetryLog> {
    let recorder = Recorder::start(session.listener());

    let flown = async {
        reset_motors(session, fault.frame_motors).await?;
        fly_to_waypoint(session, mission).await?;

        warn!("Injecting fault: motors {:?} -> {}us", fault.fault_motors, fault.fault_pwm);
        override_motors(session, &fault.fault_motors, fault.passthrough_function, fault.fault_pwm).await?;
        tokio::time::sleep(fault.hold()).await;
        anyhow::Ok(())
    }
    .await;

    let log = recorder.stop().await?;
    if let Err(e) = &flown {
        error!("flight aborted, saving {} samples recorded so far: {:#}", log.len(), e);
    }
    mf_telemetry::save(&log, output)?;
    info!("Saved {} pitch/roll samples to {}", log.len(), output.display());

    flown.map(|_| log)
}

/// Spin the vehicle by overdriving the yaw motors, then hand them back to the mixer.
pub async fn spin_yaw(session: &Session, fault: &FaultConfig) -> Result<()> {
    info!("Yawing with motors {:?} at {}us", fault.yaw_motors, fault.yaw_pwm);
    override_motors(session, &fault.yaw_motors, fault.passthrough_function, fault.yaw_pwm).await?;
    tokio::time::sleep(fault.yaw_hold()).await;

    for &m in &fault.yaw_motors {
        session.set_motor_function(m, motor_function(m)).await?;
    }
    info!("Yaw motors restored");
    Ok(())
}

/// Fly out, yaw in place, then resume the goto.
pub async fn yaw_manoeuvre(session: &mut Session, mission: &MissionConfig, fault: &FaultConfig) -> Result<()> {
    fly_to_waypoint(session, mission).await?;
    spin_yaw(session, fault).await?;

    info!("Going towards first point again ...");
    session.link().goto(mission.waypoint)?;
    tokio::time::sleep(fault.hold()).await;
    Ok(())
}
