use anyhow::{Context, Result};
use mavlink::common::{MavMessage, NAV_CONTROLLER_OUTPUT_DATA};
use mf_fc::listener::{Listener, SubscriptionId};
use mf_fc::state::is_vehicle_heartbeat;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Samples the latest NAV_CONTROLLER_OUTPUT on every autopilot heartbeat.
///
/// Messages arrive over the listener's channel; the log lives inside the
/// recording task and is handed back by [`Recorder::stop`].
pub struct Recorder {
    listener: Arc<Listener>,
    sub_id: SubscriptionId,
    task: Option<JoinHandle<crate::TelemetryLog>>,
}

impl Recorder {
    /// Must be called from within a tokio runtime.
    pub fn start(listener: &Arc<Listener>) -> Self {
        let sub = listener.subscribe(&["HEARTBEAT", "NAV_CONTROLLER_OUTPUT"]);
        info!("telemetry: recording pitch/roll on heartbeat");
        Self {
            listener: listener.clone(),
            sub_id: sub.id,
            task: Some(tokio::spawn(record(sub.rx))),
        }
    }

    /// Unsubscribe and wait for the recording task to drain.
    pub async fn stop(mut self) -> Result<crate::TelemetryLog> {
        self.listener.unsubscribe(self.sub_id);
        let task = self.task.take().context("recorder already stopped")?;
        let log = task.await.context("telemetry recorder task")?;
        info!("telemetry: stopped with {} samples", log.len());
        Ok(log)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.listener.unsubscribe(self.sub_id);
        }
    }
}

async fn record(mut rx: mpsc::UnboundedReceiver<MavMessage>) -> crate::TelemetryLog {
    let mut log = crate::TelemetryLog::new();
    let start = Instant::now();
    let mut latest: Option<NAV_CONTROLLER_OUTPUT_DATA> = None;
    let mut skipped = 0u64;

    while let Some(msg) = rx.recv().await {
        match msg {
            MavMessage::NAV_CONTROLLER_OUTPUT(nav) => latest = Some(nav),
            MavMessage::HEARTBEAT(hb) if is_vehicle_heartbeat(&hb) => match &latest {
                Some(nav) => {
                    let t_ms = start.elapsed().as_millis() as u64;
                    log.push(crate::NavSample::from_nav(t_ms, nav));
                }
                None => skipped += 1,
            },
            _ => {}
        }
    }

    if skipped > 0 {
        debug!("telemetry: {} heartbeat(s) before the first NAV_CONTROLLER_OUTPUT", skipped);
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_fc::link::FcLink;
    use mf_fc::state::VehicleState;
    use mf_fc::transport::mock::{autopilot_heartbeat, MockTransport};
    use mf_fc::FcConfig;
    use std::time::Duration;

    fn nav(pitch: f32, roll: f32) -> MavMessage {
        MavMessage::NAV_CONTROLLER_OUTPUT(NAV_CONTROLLER_OUTPUT_DATA {
            nav_roll: roll,
            nav_pitch: pitch,
            alt_error: 0.5,
            aspd_error: 0.0,
            xtrack_error: 0.0,
            nav_bearing: 90,
            target_bearing: 91,
            wp_dist: 120,
        })
    }

    fn listener() -> (Arc<MockTransport>, Arc<Listener>) {
        let mock = Arc::new(MockTransport::new());
        let link = Arc::new(FcLink::new(mock.clone(), &FcConfig::default()));
        let l = Listener::spawn(link, VehicleState::shared(), Duration::from_secs(1)).unwrap();
        (mock, l)
    }

    /// Wait until the reader thread has consumed `n` inbound messages.
    async fn consumed(listener: &Listener, n: u64) {
        for _ in 0..400 {
            if listener.state().lock().unwrap().msg_count >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // dispatch follows the state update
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn samples_latest_nav_on_each_heartbeat() {
        let (mock, listener) = listener();
        let rec = Recorder::start(&listener);

        mock.push_inbound(autopilot_heartbeat(false, 4)); // no nav yet: skipped
        mock.push_inbound(nav(1.0, -1.0));
        mock.push_inbound(autopilot_heartbeat(false, 4));
        mock.push_inbound(autopilot_heartbeat(true, 4)); // repeats the same nav
        mock.push_inbound(nav(2.0, -3.0));
        mock.push_inbound(autopilot_heartbeat(true, 4));
        consumed(&listener, 6).await;

        let log = rec.stop().await.unwrap();
        assert_eq!(log.pitch(), vec![1.0, 1.0, 2.0]);
        assert_eq!(log.roll(), vec![-1.0, -1.0, -3.0]);
        assert_eq!(log.samples[0].wp_dist, 120);
        assert!(log.samples.windows(2).all(|w| w[0].t_ms <= w[1].t_ms));
        assert_eq!(listener.subscriber_count(), 0);
        listener.shutdown();
    }

    #[tokio::test]
    async fn shutdown_ends_recording() {
        let (mock, listener) = listener();
        let rec = Recorder::start(&listener);
        mock.push_inbound(nav(0.5, 0.5));
        mock.push_inbound(autopilot_heartbeat(false, 0));
        consumed(&listener, 2).await;
        listener.shutdown();
        let log = rec.stop().await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn component_heartbeats_are_not_sampled() {
        use mavlink::common::{MavAutopilot, MavModeFlag, MavState, MavType, HEARTBEAT_DATA};

        let (mock, listener) = listener();
        let rec = Recorder::start(&listener);
        mock.push_inbound(nav(0.5, 0.5));
        mock.push_inbound(MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GIMBAL,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }));
        mock.push_inbound(autopilot_heartbeat(true, 4));
        consumed(&listener, 3).await;

        let log = rec.stop().await.unwrap();
        assert_eq!(log.len(), 1);
        listener.shutdown();
    }
}
