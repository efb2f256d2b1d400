use super::interface::{Direction, Interface};
use crate::types::Address;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::watch;

/// One side of a link: a node and the interface the link plugs into.
#[derive(Clone)]
pub struct Endpoint {
    pub node: Address,
    pub index: usize,
    pub interface: Arc<Interface>,
}

impl Endpoint {
    pub fn new(node: Address, index: usize, interface: Arc<Interface>) -> Self {
        Self { node, index, interface }
    }
}

/// Bidirectional link carrying bytes between two endpoints.
///
/// Whatever one endpoint puts on its outbound queue lands in the other
/// endpoint's inbound queue, in order. A full inbound queue holds the link
/// back rather than dropping.
pub struct Link {
    a: Endpoint,
    b: Endpoint,
}

impl Link {
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        Self { a, b }
    }

    pub fn name(&self) -> String {
        format!("{}[{}]<->{}[{}]", self.a.node, self.a.index, self.b.node, self.b.index)
    }

    /// Moves everything currently queued in both directions. Returns the
    /// number of packets carried.
    pub async fn transmit(&self) -> usize {
        carry(&self.a, &self.b).await + carry(&self.b, &self.a).await
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let name = self.name();
        info!("link {}: starting", name);

        let from_a = self.a.interface.queue(Direction::Out).arrivals();
        let from_b = self.b.interface.queue(Direction::Out).arrivals();

        // A stalled downstream node must not keep the link alive past stop,
        // so every wait also races the stop signal.
        loop {
            tokio::select! {
                _ = self.transmit() => {}
                _ = stopped(&mut stop) => break,
            }

            tokio::select! {
                _ = from_a.notified() => {}
                _ = from_b.notified() => {}
                _ = stopped(&mut stop) => break,
            }
        }
        info!("link {}: ending", name);
    }
}

async fn carry(from: &Endpoint, to: &Endpoint) -> usize {
    let mut carried = 0;
    while let Some(bytes) = from.interface.get(Direction::Out) {
        debug!(
            "link {}[{}] -> {}[{}]: {} bytes",
            from.node,
            from.index,
            to.node,
            to.index,
            bytes.len()
        );
        to.interface.queue(Direction::In).push(bytes).await;
        carried += 1;
    }
    carried
}

/// Resolves once `stop` is set or its sender is gone.
pub(super) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
