use anyhow::Result;
use mf_fc::Session;
use std::time::Duration;
use tracing::{debug, info};

use crate::MissionConfig;

const VELOCITY_PERIOD: Duration = Duration::from_millis(100);

/// Pre-arm wait, arm, climb to takeoff altitude and head for the waypoint.
pub async fn fly_to_waypoint(session: &mut Session, m: &MissionConfig) -> Result<()> {
    debug!("Basic pre-arm checks");
    let require_fix = session.config().require_gps_fix;
    // Don't try to arm until autopilot is ready
    session.wait_until("vehicle to initialise", |s| s.is_armable(require_fix)).await?;

    info!("Arming motors");
    session.link().set_mode(&m.mode)?;
    session.link().arm()?;
    session.wait_until("arming", |s| s.armed).await?;

    info!("Taking off!");
    session.link().takeoff(m.takeoff_alt_m)?;

    // The goto must wait for a safe height, takeoff returns immediately.
    let target = m.takeoff_alt_m * m.alt_reached_ratio;
    session
        .wait_until("target altitude", |s| {
            let alt = s.relative_alt_m.unwrap_or(0.0);
            info!(" Altitude: {:.2}", alt);
            alt >= target
        })
        .await?;
    info!("Reached target altitude");

    debug!("Set default/target airspeed to {}", m.airspeed_ms);
    session.link().set_airspeed(m.airspeed_ms)?;

    debug!("Going towards first point for {:?} ...", m.approach());
    session.link().goto(m.waypoint)?;
    tokio::time::sleep(m.approach()).await;

    match session.last_heartbeat() {
        Some(hb) => debug!("Last Heartbeat: {:?}", hb),
        None => debug!("Last Heartbeat: none received"),
    }
    let st = session.state();
    info!(
        "Vehicle: mode {} battery {} heartbeat age {:?}",
        st.mode_name().unwrap_or("?"),
        st.battery,
        st.hb_age().unwrap_or_default()
    );
    Ok(())
}

/// Body-agnostic NED velocity setpoint, repeated every 100ms for `cycles` periods.
pub async fn send_ned_velocity(session: &Session, vx: f32, vy: f32, vz: f32, cycles: u32) -> Result<()> {
    for _ in 0..cycles {
        session.link().send_ned_velocity(vx, vy, vz)?;
        tokio::time::sleep(VELOCITY_PERIOD).await;
    }
    Ok(())
}
