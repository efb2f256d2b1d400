use crate::error::InterfaceError;
use crate::network::{Direction, Interface};
use crate::packet::{Packet, PacketKind};
use crate::protocol::{CostTable, DistanceMatrix, MergeOutcome, RoutingUpdate};
use crate::types::Address;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Flood the initial table (with the change flag set) when the loop starts.
    pub announce_on_start: bool,
    /// Period of unchanged re-advertisements, if any.
    pub refresh_interval: Option<Duration>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            announce_on_start: true,
            refresh_interval: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub forwarded: u64,
    pub dropped_no_route: u64,
    pub dropped_full: u64,
    pub malformed: u64,
    pub updates_received: u64,
    pub updates_ignored: u64,
    pub advertisements: u64,
}

/// What happened to a data packet handed to [`Router::forward`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarding {
    Sent { interface: usize, next_hop: Address },
    NoRoute,
    QueueFull { interface: usize },
    Unencodable,
}

/// Read-only copy of a router's tables for display and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingSnapshot {
    pub router: Address,
    pub costs: CostTable,
    pub table: DistanceMatrix,
    pub stats: RouterStats,
    pub taken_at: DateTime<Utc>,
}

const CELL: usize = 5;

impl fmt::Display for RoutingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destinations: Vec<&Address> = self.table.destinations().collect();
        let routers: BTreeSet<&Address> = self
            .table
            .iter()
            .flat_map(|(_, row)| row.keys())
            .collect();
        let rule = "=".repeat((destinations.len() + 1) * (CELL + 1) + 1);

        writeln!(f, "{}", rule)?;
        write!(f, "|{:<CELL$}|", self.router)?;
        for destination in &destinations {
            write!(f, "{:>CELL$}|", destination)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", rule)?;

        for router in routers {
            write!(f, "|{:<CELL$}|", router)?;
            for destination in &destinations {
                match self.table.get(destination, router) {
                    Some(cost) => write!(f, "{:>CELL$}|", cost)?,
                    None => write!(f, "{:>CELL$}|", "-")?,
                }
            }
            writeln!(f)?;
        }
        write!(f, "{}", rule)
    }
}

/// Multi-interface router running distance-vector routing.
///
/// The router owns its tables outright; they are only touched from the task
/// running [`Router::run`]. Other tasks observe them through
/// [`Router::subscribe`].
pub struct Router {
    name: Address,
    interfaces: Vec<Arc<Interface>>,
    costs: CostTable,
    table: DistanceMatrix,
    stats: RouterStats,
    settings: RouterSettings,
    wake: Arc<Notify>,
    snapshots: watch::Sender<RoutingSnapshot>,
}

impl Router {
    pub fn new(name: Address, costs: CostTable, queue_capacity: usize) -> Self {
        Self::with_settings(name, costs, queue_capacity, RouterSettings::default())
    }

    pub fn with_settings(
        name: Address,
        costs: CostTable,
        queue_capacity: usize,
        settings: RouterSettings,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let interfaces = (0..costs.interface_count())
            .map(|_| Arc::new(Interface::with_wake(queue_capacity, wake.clone())))
            .collect();
        let table = DistanceMatrix::initial(&name, &costs);
        let snapshot = RoutingSnapshot {
            router: name.clone(),
            costs: costs.clone(),
            table: table.clone(),
            stats: RouterStats::default(),
            taken_at: Utc::now(),
        };
        info!("{}: initialized routing table", name);
        debug!("{}: initial table\n{}", name, snapshot);
        let (snapshots, _) = watch::channel(snapshot);

        Self {
            name,
            interfaces,
            costs,
            table,
            stats: RouterStats::default(),
            settings,
            wake,
            snapshots,
        }
    }

    pub fn name(&self) -> &Address {
        &self.name
    }

    pub fn interface(&self, index: usize) -> Option<Arc<Interface>> {
        self.interfaces.get(index).cloned()
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn table(&self) -> &DistanceMatrix {
        &self.table
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            router: self.name.clone(),
            costs: self.costs.clone(),
            table: self.table.clone(),
            stats: self.stats.clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RoutingSnapshot> {
        self.snapshots.subscribe()
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// One sweep over the interfaces in index order, handling at most one
    /// inbound packet per interface. Returns how many packets were handled.
    pub fn process_queues(&mut self) -> usize {
        let mut handled = 0;
        for index in 0..self.interfaces.len() {
            if let Some(bytes) = self.interfaces[index].get(Direction::In) {
                self.handle(&bytes, index);
                handled += 1;
            }
        }
        handled
    }

    /// Decodes one packet that arrived on `incoming` and dispatches it.
    pub fn handle(&mut self, bytes: &[u8], incoming: usize) {
        let packet = match Packet::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(
                    "{}: dropping undecodable packet on interface {}: {}",
                    self.name, incoming, e
                );
                self.stats.malformed += 1;
                return;
            }
        };

        match packet.kind {
            PacketKind::Data => {
                self.forward(&packet, incoming);
            }
            PacketKind::Control => {
                self.merge_advertisement(&packet, incoming);
            }
        }
    }

    fn route(&self, destination: &Address) -> Option<(usize, Address)> {
        if let Some((interface, _)) = self.costs.best_interface(destination) {
            return Some((interface, destination.clone()));
        }
        self.table
            .next_hop(destination, &self.costs)
            .map(|(neighbor, interface, _)| (interface, neighbor.clone()))
    }

    /// Forwards a data packet towards its destination. Never waits: a packet
    /// with no route or a full outbound queue is dropped and reported.
    pub fn forward(&mut self, packet: &Packet, incoming: usize) -> Forwarding {
        let Some((outgoing, next_hop)) = self.route(&packet.destination) else {
            warn!(
                "{}: no route to {}, dropping packet \"{}\" from interface {}",
                self.name,
                packet.destination,
                packet.payload_lossy(),
                incoming
            );
            self.stats.dropped_no_route += 1;
            return Forwarding::NoRoute;
        };

        let bytes = match packet.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}: cannot re-encode packet for {}: {}", self.name, packet.destination, e);
                self.stats.malformed += 1;
                return Forwarding::Unencodable;
            }
        };

        let Some(interface) = self.interfaces.get(outgoing) else {
            warn!("{}: interface {} towards {} does not exist", self.name, outgoing, next_hop);
            self.stats.dropped_no_route += 1;
            return Forwarding::NoRoute;
        };

        match interface.try_put(Direction::Out, bytes) {
            Ok(()) => {
                info!(
                    "{}: forwarding packet \"{}\" for {} from interface {} to {} via {}",
                    self.name,
                    packet.payload_lossy(),
                    packet.destination,
                    incoming,
                    outgoing,
                    next_hop
                );
                self.stats.forwarded += 1;
                Forwarding::Sent {
                    interface: outgoing,
                    next_hop,
                }
            }
            Err(InterfaceError::Full) => {
                warn!(
                    "{}: packet for {} from interface {} lost on interface {}: queue full",
                    self.name, packet.destination, incoming, outgoing
                );
                self.stats.dropped_full += 1;
                Forwarding::QueueFull { interface: outgoing }
            }
        }
    }

    /// Applies a routing update received on `incoming`.
    ///
    /// Only updates with the change flag set are merged; if the merge or the
    /// relaxation that follows changes anything, the new table is flooded on
    /// every interface.
    pub fn merge_advertisement(&mut self, packet: &Packet, incoming: usize) -> MergeOutcome {
        self.stats.updates_received += 1;

        let Some((sender, link_cost)) = self
            .costs
            .neighbor_on(incoming)
            .map(|(neighbor, cost)| (neighbor.clone(), cost))
        else {
            warn!(
                "{}: routing update on interface {} with no attached neighbor, ignored",
                self.name, incoming
            );
            return MergeOutcome::default();
        };

        let update = match RoutingUpdate::from_packet(packet) {
            Ok(update) => update,
            Err(e) => {
                warn!("{}: unreadable routing update from {}: {}", self.name, sender, e);
                self.stats.malformed += 1;
                return MergeOutcome::default();
            }
        };

        if !update.change {
            debug!(
                "{}: routing update from {} on interface {} carries no change",
                self.name, sender, incoming
            );
            self.stats.updates_ignored += 1;
            return MergeOutcome::default();
        }

        let outcome = self.table.merge(&self.name, &sender, link_cost, &update.table);
        info!(
            "{}: received routing update from {} on interface {} ({} merged, {} relaxed)",
            self.name, sender, incoming, outcome.merged, outcome.relaxed
        );

        if outcome.changed() {
            debug!("{}: table changed\n{}", self.name, self.snapshot());
            self.advertise(true);
        }
        outcome
    }

    /// Sends the whole table on every interface. Returns how many interfaces
    /// accepted it; the others are reported as losses.
    pub fn advertise(&mut self, change: bool) -> usize {
        let update = RoutingUpdate::new(self.table.clone(), change);
        let mut sent = 0;

        for (index, interface) in self.interfaces.iter().enumerate() {
            let destination = self
                .costs
                .neighbor_on(index)
                .map(|(neighbor, _)| neighbor.clone())
                .unwrap_or_else(|| self.name.clone());

            let bytes = match update.to_packet(destination).and_then(|p| p.to_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("{}: cannot encode routing update for interface {}: {}", self.name, index, e);
                    continue;
                }
            };

            match interface.try_put(Direction::Out, bytes) {
                Ok(()) => {
                    debug!("{}: sending routing update (change={}) on interface {}", self.name, change, index);
                    sent += 1;
                }
                Err(InterfaceError::Full) => {
                    warn!("{}: routing update lost on interface {}: queue full", self.name, index);
                    self.stats.dropped_full += 1;
                }
            }
        }

        self.stats.advertisements += 1;
        sent
    }

    /// Processing loop. Sleeps while no interface has input and returns after
    /// the first iteration that observes `stop` set (or its sender gone).
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("{}: starting", self.name);

        let wake = self.wake.clone();
        let mut refresh = self.settings.refresh_interval.map(|period| {
            let mut timer = tokio::time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        if self.settings.announce_on_start {
            self.advertise(true);
            self.publish();
        }

        loop {
            let handled = self.process_queues();
            if handled > 0 {
                self.publish();
            }

            if *stop.borrow() {
                break;
            }

            if handled > 0 {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = wake.notified() => {}
                _ = next_refresh(&mut refresh) => {
                    self.advertise(false);
                    self.publish();
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.publish();
        info!("{}: ending", self.name);
    }
}

async fn next_refresh(refresh: &mut Option<Interval>) {
    match refresh {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
