use anyhow::{Context, Result};
use mavlink::{common::MavMessage, Message};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::link::FcLink;
use crate::state::SharedState;

pub type SubscriptionId = u64;

/// Receiving end of a message-name filter registered with the listener.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub rx: mpsc::UnboundedReceiver<MavMessage>,
}

struct Subscriber {
    id: SubscriptionId,
    names: Vec<String>,
    tx: mpsc::UnboundedSender<MavMessage>,
}

/// Background reader: folds every inbound message into the shared state,
/// fans it out to subscribers and keeps our GCS heartbeat going.
pub struct Listener {
    link: Arc<FcLink>,
    state: SharedState,
    subs: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    stop: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Listener {
    pub fn spawn(link: Arc<FcLink>, state: SharedState, heartbeat_interval: Duration) -> Result<Arc<Self>> {
        let listener = Arc::new(Self {
            link,
            state,
            subs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            stop: AtomicBool::new(false),
            handle: Mutex::new(None),
        });

        let reader = listener.clone();
        // Reader loop on its own thread (mavlink recv blocks).
        let handle = std::thread::Builder::new()
            .name("mav-reader".into())
            .spawn(move || reader.run(heartbeat_interval))
            .context("spawn mavlink reader thread")?;
        *listener.handle.lock().unwrap() = Some(handle);

        Ok(listener)
    }

    fn run(&self, heartbeat_interval: Duration) {
        let mut last_hb_send: Option<Instant> = None;

        while !self.is_stopped() {
            if last_hb_send.map_or(true, |t| t.elapsed() >= heartbeat_interval) {
                if let Err(e) = self.link.send_heartbeat() {
                    debug!("GCS heartbeat not sent: {:#}", e);
                }
                last_hb_send = Some(Instant::now());
            }

            match self.link.transport().recv() {
                Ok((hdr, msg)) => {
                    self.state.lock().unwrap().apply(&hdr, &msg);
                    log_notable(&msg);
                    self.dispatch(&msg);
                }
                Err(e) => {
                    if self.is_stopped() {
                        break;
                    }
                    trace!("mavlink recv: {:#}", e);
                    // Light sleep to avoid busy loop
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
        debug!("mavlink reader thread exiting");
    }

    fn dispatch(&self, msg: &MavMessage) {
        let name = msg.message_name();
        let mut subs = self.subs.lock().unwrap();
        subs.retain(|s| {
            if !s.names.iter().any(|n| n == name) {
                return true;
            }
            // receiver gone: drop the subscriber
            s.tx.send(msg.clone()).is_ok()
        });
    }

    /// Deliver every message whose MAVLink name is in `names`.
    pub fn subscribe(&self, names: &[&str]) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.lock().unwrap().push(Subscriber {
            id,
            names: names.iter().map(|n| n.to_string()).collect(),
            tx,
        });
        debug!("listener: subscription {} for {:?}", id, names);
        Subscription { id, rx }
    }

    /// Dropping the sender ends the receiver's stream.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs.lock().unwrap();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if removed {
            debug!("listener: removed subscription {}", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock().unwrap().len()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Stop reading, end all subscriptions and close the transport.
    /// The reader thread is detached; it leaves after its current `recv` returns.
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut subs = self.subs.lock().unwrap();
            let n = subs.len();
            subs.clear();
            n
        };
        if dropped > 0 {
            warn!("listener: {} subscription(s) still open at shutdown", dropped);
        }
        self.link.transport().close();
        drop(self.handle.lock().unwrap().take());
        info!("listener: stopped");
    }
}

fn log_notable(msg: &MavMessage) {
    match msg {
        MavMessage::COMMAND_ACK(ack) => info!("FC: ack {:?} -> {:?}", ack.command, ack.result),
        MavMessage::STATUSTEXT(text) => {
            let s: String = text.text.iter().take_while(|&&c| c != 0).map(|&c| c as char).collect();
            info!("FC: {}", s);
        }
        _ => {}
    }
}
