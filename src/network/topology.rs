use super::interface::Interface;
use super::link::{Endpoint, Link, stopped};
use crate::config::{EndpointConfig, TopologyConfig, TrafficConfig};
use crate::host::{Delivery, Host, HostSender};
use crate::protocol::DistanceMatrix;
use crate::router::{Router, RoutingSnapshot};
use crate::types::Address;
use anyhow::{Context, anyhow};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running simulation: every node and link of a topology on its own task.
pub struct Network {
    routers: BTreeMap<Address, watch::Receiver<RoutingSnapshot>>,
    hosts: BTreeMap<Address, HostSender>,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    stop: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Network {
    /// Builds the topology and spawns its tasks. Must be called from within
    /// a tokio runtime.
    pub fn start(config: &TopologyConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let capacity = config.settings.queue_capacity;
        let (stop, stop_rx) = watch::channel(false);
        let (delivery_tx, deliveries) = mpsc::unbounded_channel();
        let mut interfaces: BTreeMap<(Address, usize), Arc<Interface>> = BTreeMap::new();
        let mut tasks = Vec::new();

        let mut routers = BTreeMap::new();
        for name in &config.routers {
            let router = Router::with_settings(
                name.clone(),
                config.cost_table(name),
                capacity,
                config.settings.router_settings(),
            );
            for index in 0..router.interface_count() {
                if let Some(interface) = router.interface(index) {
                    interfaces.insert((name.clone(), index), interface);
                }
            }
            routers.insert(name.clone(), router.subscribe());
            tasks.push((name.to_string(), tokio::spawn(router.run(stop_rx.clone()))));
        }

        let mut hosts = BTreeMap::new();
        for addr in &config.hosts {
            let host = Host::new(addr.clone(), capacity);
            interfaces.insert((addr.clone(), 0), host.interface());
            hosts.insert(addr.clone(), host.sender());
            tasks.push((
                addr.to_string(),
                tokio::spawn(host.run(stop_rx.clone(), delivery_tx.clone())),
            ));
        }

        for link in &config.links {
            let link = Link::new(
                endpoint(&interfaces, &link.a)?,
                endpoint(&interfaces, &link.b)?,
            );
            let name = link.name();
            tasks.push((name, tokio::spawn(link.run(stop_rx.clone()))));
        }

        info!(
            "network started: {} routers, {} hosts, {} links",
            routers.len(),
            hosts.len(),
            config.links.len()
        );

        Ok(Self {
            routers,
            hosts,
            deliveries,
            stop,
            tasks,
        })
    }

    pub fn host(&self, addr: &Address) -> Option<&HostSender> {
        self.hosts.get(addr)
    }

    pub async fn send(&self, from: &Address, to: Address, payload: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        let host = self
            .host(from)
            .ok_or_else(|| anyhow!("{} is not a host of this network", from))?;
        host.send(to, payload).await
    }

    /// Schedules the configured traffic. Packets not yet sent when the
    /// network stops are abandoned.
    pub fn inject(&mut self, traffic: &[TrafficConfig]) -> anyhow::Result<()> {
        for item in traffic {
            let sender = self
                .host(&item.from)
                .cloned()
                .ok_or_else(|| anyhow!("{} is not a host of this network", item.from))?;
            let to = item.to.clone();
            let payload = item.payload.clone();
            let delay = Duration::from_millis(item.after_ms);
            let mut stop = self.stop.subscribe();

            let task = tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if let Err(e) = sender.send(to, payload).await {
                            warn!("{}: could not send: {}", sender.addr(), e);
                        }
                    }
                    _ = stopped(&mut stop) => {}
                }
            });
            self.tasks.push((format!("traffic from {}", item.from), task));
        }
        Ok(())
    }

    pub fn snapshot(&self, router: &Address) -> Option<RoutingSnapshot> {
        self.routers.get(router).map(|rx| rx.borrow().clone())
    }

    pub fn snapshots(&self) -> Vec<RoutingSnapshot> {
        self.routers.values().map(|rx| rx.borrow().clone()).collect()
    }

    fn tables(&self) -> Vec<DistanceMatrix> {
        self.routers.values().map(|rx| rx.borrow().table.clone()).collect()
    }

    /// Waits until no routing table changes over two consecutive `quiet`
    /// windows, giving up after `limit`. Returns whether that happened.
    pub async fn settle(&self, quiet: Duration, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut last = self.tables();
        let mut stable = 0;

        while Instant::now() < deadline {
            tokio::time::sleep(quiet).await;
            let current = self.tables();
            if current == last {
                stable += 1;
                if stable == 2 {
                    return true;
                }
            } else {
                stable = 0;
                last = current;
            }
        }
        false
    }

    /// Deliveries reported by hosts so far.
    pub fn drain_deliveries(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = self.deliveries.try_recv() {
            out.push(delivery);
        }
        out
    }

    /// Signals every task to stop, waits for them, and returns the final
    /// routing tables together with any deliveries not yet drained.
    pub async fn shutdown(mut self) -> (Vec<RoutingSnapshot>, Vec<Delivery>) {
        let _ = self.stop.send(true);

        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{}: task failed: {}", name, e),
                Err(_) => {
                    warn!("{}: did not stop in time, aborting", name);
                    handle.abort();
                }
            }
        }

        info!("network stopped");
        let deliveries = self.drain_deliveries();
        (self.snapshots(), deliveries)
    }
}

fn endpoint(
    interfaces: &BTreeMap<(Address, usize), Arc<Interface>>,
    config: &EndpointConfig,
) -> anyhow::Result<Endpoint> {
    let interface = interfaces
        .get(&(config.node.clone(), config.interface))
        .cloned()
        .with_context(|| format!("{} has no interface {}", config.node, config.interface))?;
    Ok(Endpoint::new(config.node.clone(), config.interface, interface))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkConfig, SimulationSettings};

    fn link(a: (&str, usize), b: (&str, usize), cost: u32) -> LinkConfig {
        LinkConfig {
            a: EndpointConfig {
                node: Address::from(a.0),
                interface: a.1,
            },
            b: EndpointConfig {
                node: Address::from(b.0),
                interface: b.1,
            },
            cost,
        }
    }

    fn two_hosts_one_router() -> TopologyConfig {
        TopologyConfig {
            settings: SimulationSettings::default(),
            hosts: vec![Address::from("1"), Address::from("2")],
            routers: vec![Address::from("RA")],
            links: vec![link(("1", 0), ("RA", 0), 1), link(("2", 0), ("RA", 1), 1)],
            traffic: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_host_to_host_through_router() {
        let mut network = Network::start(&two_hosts_one_router()).unwrap();
        network
            .send(&Address::from("1"), Address::from("2"), "hello")
            .await
            .unwrap();

        let mut deliveries = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while deliveries.is_empty() {
                deliveries.extend(network.drain_deliveries());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(deliveries[0].host, Address::from("2"));
        assert_eq!(deliveries[0].payload, "hello");

        let (snapshots, _) = network.shutdown().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].stats.forwarded, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inject_sends_scheduled_traffic() {
        let mut config = two_hosts_one_router();
        config.traffic = vec![
            TrafficConfig {
                from: Address::from("1"),
                to: Address::from("2"),
                payload: "soon".to_string(),
                after_ms: 10,
            },
            TrafficConfig {
                from: Address::from("2"),
                to: Address::from("1"),
                payload: "never".to_string(),
                after_ms: 60_000,
            },
        ];
        let mut network = Network::start(&config).unwrap();
        network.inject(&config.traffic).unwrap();

        let mut deliveries = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while deliveries.is_empty() {
                deliveries.extend(network.drain_deliveries());
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(deliveries[0].payload, "soon");

        // The pending packet is abandoned rather than holding up shutdown
        let (_, rest) = tokio::time::timeout(Duration::from_secs(2), network.shutdown())
            .await
            .unwrap();
        assert!(rest.iter().all(|d| d.payload != "never"));
    }

    #[tokio::test]
    async fn test_send_from_unknown_host_fails() {
        let network = Network::start(&two_hosts_one_router()).unwrap();
        assert!(network.send(&Address::from("RA"), Address::from("2"), "x").await.is_err());
        network.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_topology_is_rejected() {
        let mut config = two_hosts_one_router();
        config.links.push(link(("RA", 0), ("2", 0), 1));
        assert!(Network::start(&config).is_err());
    }
}
