//! Scoped connection to the vehicle.
//!
//! A [`Session`] owns the link, the reader thread and a HEARTBEAT
//! subscription. Whichever way the scope ends (explicit [`Session::close`],
//! an early `?` return, a panic) the teardown runs exactly once and in this
//! order: disarm if armed, drop the heartbeat subscription, close the link.

use anyhow::Result;
use mavlink::common::{MavMessage, HEARTBEAT_DATA};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::connstr;
use crate::error::FcError;
use crate::link::FcLink;
use crate::listener::{Listener, Subscription};
use crate::state::{is_vehicle_heartbeat, SharedState, VehicleState};
use crate::transport::{MavTransport, MavlinkTransport};
use crate::FcConfig;

pub struct Session {
    cfg: FcConfig,
    link: Arc<FcLink>,
    state: SharedState,
    listener: Arc<Listener>,
    heartbeat: Option<Subscription>,
    last_heartbeat: Option<HEARTBEAT_DATA>,
    closed: bool,
}

impl Session {
    pub async fn connect(conn: &str, cfg: &FcConfig) -> Result<Self> {
        let addr = connstr::parse(conn)?;
        debug!("connecting to Drone (or SITL/HITL) on: {}", addr.to_url());
        let transport = MavlinkTransport::open(&addr)?;
        Self::open(Arc::new(transport), cfg).await
    }

    /// Start the reader on an already open transport and wait until the
    /// autopilot has been heard from.
    pub async fn open(transport: Arc<dyn MavTransport>, cfg: &FcConfig) -> Result<Self> {
        let link = Arc::new(FcLink::new(transport, cfg));
        let state = VehicleState::shared_for(cfg.target_sys);
        let listener = Listener::spawn(link.clone(), state.clone(), cfg.heartbeat_interval())?;

        // From here on Drop tears everything down.
        let mut session = Self {
            cfg: cfg.clone(),
            link,
            state,
            listener,
            heartbeat: None,
            last_heartbeat: None,
            closed: false,
        };

        session.wait_until("autopilot heartbeat", |s| s.heartbeat_seen()).await?;
        if cfg.stream_rate_hz > 0 {
            session.link.request_data_streams(cfg.stream_rate_hz)?;
        }
        info!("Drone connection successful");

        info!("session: subscribing to HEARTBEAT");
        session.heartbeat = Some(session.listener.subscribe(&["HEARTBEAT"]));
        Ok(session)
    }

    pub fn link(&self) -> &FcLink {
        &self.link
    }

    pub fn listener(&self) -> &Arc<Listener> {
        &self.listener
    }

    pub fn config(&self) -> &FcConfig {
        &self.cfg
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }

    /// Snapshot of the vehicle state.
    pub fn state(&self) -> VehicleState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().unwrap().armed
    }

    /// Most recent autopilot heartbeat delivered to this session's subscription.
    pub fn last_heartbeat(&mut self) -> Option<&HEARTBEAT_DATA> {
        if let Some(sub) = self.heartbeat.as_mut() {
            while let Ok(msg) = sub.rx.try_recv() {
                if let MavMessage::HEARTBEAT(hb) = msg {
                    if is_vehicle_heartbeat(&hb) {
                        self.last_heartbeat = Some(hb);
                    }
                }
            }
        }
        self.last_heartbeat.as_ref()
    }

    /// Poll the shared state every `poll_interval_ms` until `ready` holds.
    /// Without a configured `wait_timeout_s` this waits indefinitely.
    pub async fn wait_until<F>(&self, what: &str, mut ready: F) -> Result<()>
    where
        F: FnMut(&VehicleState) -> bool,
    {
        let start = Instant::now();
        loop {
            {
                let st = self.state.lock().unwrap();
                if ready(&st) {
                    return Ok(());
                }
            }
            if self.listener.is_stopped() {
                return Err(FcError::Closed.into());
            }
            if let Some(limit) = self.cfg.wait_timeout() {
                if start.elapsed() >= limit {
                    return Err(FcError::Timeout(limit, what.to_string()).into());
                }
            }
            debug!("waiting for {}...", what);
            tokio::time::sleep(self.cfg.poll_interval()).await;
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("session: disarming, stopping heartbeat listener and closing connection");

        let armed = match self.state.lock() {
            Ok(st) => st.armed,
            Err(poisoned) => poisoned.into_inner().armed,
        };

        let mut result = Ok(());
        if armed {
            if let Err(e) = self.link.disarm() {
                warn!("session: disarm failed: {:#}", e);
                result = Err(e);
            }
        }

        if let Some(sub) = self.heartbeat.take() {
            self.listener.unsubscribe(sub.id);
        }

        info!("disconnect -> closing Drone connection");
        self.listener.shutdown();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("session teardown: {:#}", e);
        }
    }
}
