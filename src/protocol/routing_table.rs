use crate::types::{Address, Cost, UNREACHABLE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Direct links of a router: neighbor -> (interface index -> link cost).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    links: BTreeMap<Address, BTreeMap<usize, Cost>>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&mut self, neighbor: Address, interface: usize, cost: Cost) {
        self.links.entry(neighbor).or_default().insert(interface, cost);
    }

    pub fn is_neighbor(&self, address: &Address) -> bool {
        self.links.contains_key(address)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Address> {
        self.links.keys()
    }

    /// Cheapest interface towards `neighbor`, ties going to the lowest index.
    pub fn best_interface(&self, neighbor: &Address) -> Option<(usize, Cost)> {
        self.links
            .get(neighbor)?
            .iter()
            .map(|(&interface, &cost)| (interface, cost))
            .min_by_key(|&(interface, cost)| (cost, interface))
    }

    /// Neighbor attached to `interface` and the cost of that link.
    pub fn neighbor_on(&self, interface: usize) -> Option<(&Address, Cost)> {
        self.links.iter().find_map(|(neighbor, interfaces)| {
            interfaces.get(&interface).map(|&cost| (neighbor, cost))
        })
    }

    pub fn interface_count(&self) -> usize {
        self.links
            .values()
            .flat_map(|interfaces| interfaces.keys())
            .map(|&interface| interface + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &BTreeMap<usize, Cost>)> {
        self.links.iter()
    }
}

/// Outcome of merging one advertisement into the local matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries added or lowered by the advertised triples.
    pub merged: usize,
    /// Entries lowered by the relaxation sweeps that followed.
    pub relaxed: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.merged > 0 || self.relaxed > 0
    }
}

/// Routing table: destination -> (router -> best known cost from that
/// router to the destination).
///
/// The column of the owning router is its own distance vector; the other
/// columns hold what neighbors advertised about themselves and others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistanceMatrix {
    rows: BTreeMap<Address, BTreeMap<Address, Cost>>,
}

impl DistanceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial table of `owner`: zero to itself and the cheapest direct link
    /// to every neighbor.
    pub fn initial(owner: &Address, costs: &CostTable) -> Self {
        let mut matrix = Self::new();
        matrix.set(owner.clone(), owner.clone(), 0);
        for (neighbor, interfaces) in costs.iter() {
            if let Some(&cost) = interfaces.values().min() {
                matrix.set(neighbor.clone(), owner.clone(), cost);
            }
        }
        matrix
    }

    pub fn get(&self, destination: &Address, router: &Address) -> Option<Cost> {
        self.rows.get(destination)?.get(router).copied()
    }

    /// Like [`get`](Self::get) but absent entries read as [`UNREACHABLE`].
    pub fn cost(&self, destination: &Address, router: &Address) -> Cost {
        self.get(destination, router).unwrap_or(UNREACHABLE)
    }

    pub fn row(&self, destination: &Address) -> Option<&BTreeMap<Address, Cost>> {
        self.rows.get(destination)
    }

    pub fn contains(&self, destination: &Address) -> bool {
        self.rows.contains_key(destination)
    }

    pub fn set(&mut self, destination: Address, router: Address, cost: Cost) {
        self.rows.entry(destination).or_default().insert(router, cost);
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Address> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &BTreeMap<Address, Cost>)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every router with a column, plus router-named destinations.
    pub fn known_routers(&self) -> BTreeSet<Address> {
        let mut routers: BTreeSet<Address> = self
            .rows
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect();
        routers.extend(self.rows.keys().filter(|d| d.is_router()).cloned());
        routers
    }

    /// Lowers an entry, inserting it if missing. Returns whether it changed.
    fn lower(&mut self, destination: &Address, router: &Address, cost: Cost) -> bool {
        let row = self.rows.entry(destination.clone()).or_default();
        match row.get(router) {
            Some(&current) if current <= cost => false,
            _ => {
                row.insert(router.clone(), cost);
                true
            }
        }
    }

    /// Merges the matrix `sender` advertised over a link of `link_cost`.
    ///
    /// `owner`'s own column is never taken from an advertisement; it is only
    /// derived through [`relax`](Self::relax).
    pub fn merge(
        &mut self,
        owner: &Address,
        sender: &Address,
        link_cost: Cost,
        advertised: &DistanceMatrix,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (destination, reports) in advertised.iter() {
            for (reporter, &cost) in reports {
                if reporter == owner || cost >= UNREACHABLE {
                    continue;
                }

                if !self.contains(destination) {
                    self.set(destination.clone(), reporter.clone(), cost);
                    if reporter == sender {
                        self.lower(destination, owner, cost.saturating_add(link_cost));
                    }
                    outcome.merged += 1;
                } else if self.lower(destination, reporter, cost) {
                    outcome.merged += 1;
                }
            }
        }

        outcome.relaxed = self.relax();
        outcome
    }

    /// Triangle tightening over the held estimates until nothing improves.
    ///
    /// `matrix[d][alt] + matrix[r][alt]` bounds `matrix[d][r]` for every
    /// known `alt`. Sweeps are bounded by the number of known routers plus
    /// one. Returns the number of entries lowered.
    pub fn relax(&mut self) -> usize {
        let routers = self.known_routers();
        let destinations: Vec<Address> = self.rows.keys().cloned().collect();
        let mut lowered = 0;

        for destination in destinations.iter().filter(|d| d.is_router()) {
            if self.lower(destination, destination, 0) {
                lowered += 1;
            }
        }

        for _ in 0..=routers.len() {
            let mut improved = 0;
            for destination in &destinations {
                for router in &routers {
                    let mut best = self.cost(destination, router);
                    for alt in &routers {
                        let (Some(to_dest), Some(to_router)) =
                            (self.get(destination, alt), self.get(router, alt))
                        else {
                            continue;
                        };
                        let candidate = to_dest.saturating_add(to_router);
                        if candidate < best {
                            best = candidate;
                        }
                    }
                    if best < UNREACHABLE && self.lower(destination, router, best) {
                        improved += 1;
                    }
                }
            }
            if improved == 0 {
                break;
            }
            lowered += improved;
        }

        lowered
    }

    /// Next hop towards a destination that is not a direct neighbor.
    ///
    /// A neighbor column holds the neighbor's own distance, so candidates are
    /// ranked by that distance plus the link to the neighbor; ties go to the
    /// cheaper link and then the lower interface index. The returned cost is
    /// the total through the chosen neighbor.
    pub fn next_hop<'a>(
        &self,
        destination: &Address,
        costs: &'a CostTable,
    ) -> Option<(&'a Address, usize, Cost)> {
        let row = self.row(destination)?;
        costs
            .neighbors()
            .filter_map(|neighbor| {
                let recorded = *row.get(neighbor)?;
                let (interface, link_cost) = costs.best_interface(neighbor)?;
                Some((neighbor, interface, recorded.saturating_add(link_cost), link_cost))
            })
            .min_by_key(|&(_, interface, total, link_cost)| (total, link_cost, interface))
            .map(|(neighbor, interface, total, _)| (neighbor, interface, total))
    }
}
