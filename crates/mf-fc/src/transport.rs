use anyhow::{Context, Result};
use mavlink::{common::MavMessage, MavConnection, MavHeader};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::connstr::MavAddress;
use crate::error::FcError;

/// Byte-level MAVLink endpoint. Both calls may block.
pub trait MavTransport: Send + Sync {
    fn send(&self, header: &MavHeader, msg: &MavMessage) -> Result<()>;
    fn recv(&self) -> Result<(MavHeader, MavMessage)>;
    /// Further sends fail after this. The socket itself goes away with the last reference.
    fn close(&self);
}

pub struct MavlinkTransport {
    conn: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    url: String,
    closed: AtomicBool,
}

impl MavlinkTransport {
    /// Must run inside a tokio runtime when `addr` is a serial device.
    pub fn open(addr: &MavAddress) -> Result<Self> {
        if let MavAddress::Serial { dev, baud } = addr {
            // quick validate device
            let _ = tokio_serial::new(dev, *baud)
                .open_native_async()
                .with_context(|| format!("open fc serial device {}", dev))?;
        }

        let url = addr.to_url();
        let conn = mavlink::connect::<MavMessage>(&url)
            .with_context(|| format!("mavlink connect {}", url))?;
        info!("mavlink: opened {}", url);

        Ok(Self { conn, url, closed: AtomicBool::new(false) })
    }
}

impl MavTransport for MavlinkTransport {
    fn send(&self, header: &MavHeader, msg: &MavMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FcError::Closed.into());
        }
        self.conn.send(header, msg).context("mavlink send")?;
        Ok(())
    }

    fn recv(&self) -> Result<(MavHeader, MavMessage)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FcError::Closed.into());
        }
        let (hdr, msg) = self.conn.recv().context("mavlink recv")?;
        Ok((hdr, msg))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("mavlink: closed {}", self.url);
        }
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use mavlink::common::{HEARTBEAT_DATA, MavAutopilot, MavModeFlag, MavState, MavType};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub enum Event {
        Sent(MavMessage),
        Closed,
    }

    type Reply = Box<dyn FnMut(&MavMessage) -> Vec<MavMessage> + Send>;
    type Hook = Box<dyn Fn() + Send>;

    /// In-memory transport: records what we send, replays what the test queues.
    pub struct MockTransport {
        events: Mutex<Vec<Event>>,
        inbound: Mutex<VecDeque<MavMessage>>,
        reply: Mutex<Option<Reply>>,
        on_close: Mutex<Option<Hook>>,
        closed: AtomicBool,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                inbound: Mutex::new(VecDeque::new()),
                reply: Mutex::new(None),
                on_close: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        }

        pub fn push_inbound(&self, msg: MavMessage) {
            self.inbound.lock().unwrap().push_back(msg);
        }

        /// Called for every sent message; whatever it returns is queued inbound.
        pub fn set_reply(&self, f: impl FnMut(&MavMessage) -> Vec<MavMessage> + Send + 'static) {
            *self.reply.lock().unwrap() = Some(Box::new(f));
        }

        /// Runs inside `close`, before the `Closed` event is recorded.
        pub fn set_on_close(&self, f: impl Fn() + Send + 'static) {
            *self.on_close.lock().unwrap() = Some(Box::new(f));
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn sent(&self) -> Vec<MavMessage> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Sent(m) => Some(m),
                    Event::Closed => None,
                })
                .collect()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    impl MavTransport for MockTransport {
        fn send(&self, _header: &MavHeader, msg: &MavMessage) -> Result<()> {
            if self.is_closed() {
                return Err(FcError::Closed.into());
            }
            self.events.lock().unwrap().push(Event::Sent(msg.clone()));
            let replies = match self.reply.lock().unwrap().as_mut() {
                Some(f) => f(msg),
                None => Vec::new(),
            };
            self.inbound.lock().unwrap().extend(replies);
            Ok(())
        }

        fn recv(&self) -> Result<(MavHeader, MavMessage)> {
            if self.is_closed() {
                return Err(FcError::Closed.into());
            }
            match self.inbound.lock().unwrap().pop_front() {
                Some(msg) => Ok((MavHeader { system_id: 1, component_id: 1, sequence: 0 }, msg)),
                None => {
                    std::thread::sleep(Duration::from_millis(2));
                    anyhow::bail!("mock: nothing queued")
                }
            }
        }

        fn close(&self) {
            if let Some(f) = self.on_close.lock().unwrap().as_ref() {
                f();
            }
            self.closed.store(true, Ordering::Release);
            self.events.lock().unwrap().push(Event::Closed);
        }
    }

    pub fn autopilot_heartbeat(armed: bool, custom_mode: u32) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }
}
