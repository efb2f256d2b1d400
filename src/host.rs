use crate::network::{Direction, Interface};
use crate::packet::{Packet, PacketKind};
use crate::types::Address;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, watch};

/// Data packet that reached its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub host: Address,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// End host with a single interface. Makes no routing decisions.
pub struct Host {
    addr: Address,
    interface: Arc<Interface>,
    wake: Arc<Notify>,
}

impl Host {
    pub fn new(addr: Address, queue_capacity: usize) -> Self {
        let wake = Arc::new(Notify::new());
        Self {
            addr,
            interface: Arc::new(Interface::with_wake(queue_capacity, wake.clone())),
            wake,
        }
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn interface(&self) -> Arc<Interface> {
        self.interface.clone()
    }

    pub fn sender(&self) -> HostSender {
        HostSender {
            addr: self.addr.clone(),
            interface: self.interface.clone(),
        }
    }

    /// Handles one queued arrival, if any. Returns whether there was one.
    pub fn receive(&self, deliveries: &mpsc::UnboundedSender<Delivery>) -> bool {
        let Some(bytes) = self.interface.get(Direction::In) else {
            return false;
        };

        match Packet::from_bytes(&bytes) {
            Ok(packet) if packet.kind == PacketKind::Data => {
                info!("{}: received packet \"{}\"", self.addr, packet.payload_lossy());
                let delivery = Delivery {
                    host: self.addr.clone(),
                    payload: packet.payload_lossy().into_owned(),
                    received_at: Utc::now(),
                };
                if deliveries.send(delivery).is_err() {
                    debug!("{}: nobody is collecting deliveries", self.addr);
                }
            }
            Ok(_) => debug!("{}: ignoring routing update", self.addr),
            Err(e) => warn!("{}: dropping undecodable packet: {}", self.addr, e),
        }
        true
    }

    /// Receive loop; ends once `stop` is set or its sender is gone.
    pub async fn run(self, mut stop: watch::Receiver<bool>, deliveries: mpsc::UnboundedSender<Delivery>) {
        info!("{}: starting", self.addr);
        loop {
            while self.receive(&deliveries) {}

            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("{}: ending", self.addr);
    }
}

/// Cloneable sending side of a [`Host`].
#[derive(Clone)]
pub struct HostSender {
    addr: Address,
    interface: Arc<Interface>,
}

impl HostSender {
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// Queues a data packet for `destination`, waiting for room if the
    /// outbound queue is full.
    pub async fn send(&self, destination: Address, payload: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        let packet = Packet::data(destination, payload);
        let bytes = packet.to_bytes()?;
        info!("{}: sending packet \"{}\" to {}", self.addr, packet.payload_lossy(), packet.destination);
        self.interface.put(Direction::Out, bytes, true).await?;
        Ok(())
    }
}
