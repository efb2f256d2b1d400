use crate::error::ConfigError;
use crate::protocol::CostTable;
use crate::router::RouterSettings;
use crate::types::{Address, Cost};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::time::Duration;

/// A network to simulate: its nodes, the links between them, the traffic
/// hosts inject, and simulation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub settings: SimulationSettings,
    pub hosts: Vec<Address>,
    pub routers: Vec<Address>,
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub traffic: Vec<TrafficConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Capacity of every interface queue; 0 is unbounded.
    pub queue_capacity: usize,
    pub announce_on_start: bool,
    /// Period of unchanged re-advertisements in milliseconds; 0 disables them.
    pub refresh_interval_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            announce_on_start: true,
            refresh_interval_ms: 0,
        }
    }
}

impl SimulationSettings {
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            announce_on_start: self.announce_on_start,
            refresh_interval: (self.refresh_interval_ms > 0)
                .then(|| Duration::from_millis(self.refresh_interval_ms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub node: Address,
    pub interface: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: EndpointConfig,
    pub b: EndpointConfig,
    pub cost: Cost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub from: Address,
    pub to: Address,
    pub payload: String,
    /// Delay after start-up before the packet is sent.
    #[serde(default)]
    pub after_ms: u64,
}

impl TopologyConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TopologyConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for host in &self.hosts {
            if !is_valid_host_address(host) {
                return Err(ConfigError::InvalidHostAddress(host.clone()));
            }
            if !seen.insert(host) {
                return Err(ConfigError::DuplicateNode(host.clone()));
            }
        }
        for router in &self.routers {
            if !router.is_router() || router.as_str().len() > crate::packet::DESTINATION_LEN {
                return Err(ConfigError::InvalidRouterName(router.clone()));
            }
            if !seen.insert(router) {
                return Err(ConfigError::DuplicateNode(router.clone()));
            }
        }

        let mut used: BTreeMap<&Address, BTreeSet<usize>> = BTreeMap::new();
        for link in &self.links {
            for end in [&link.a, &link.b] {
                if !seen.contains(&end.node) {
                    return Err(ConfigError::UnknownNode(end.node.clone()));
                }
                if !end.node.is_router() && end.interface != 0 {
                    return Err(ConfigError::HostInterface(end.node.clone()));
                }
                if !used.entry(&end.node).or_default().insert(end.interface) {
                    return Err(ConfigError::InterfaceInUse {
                        node: end.node.clone(),
                        interface: end.interface,
                    });
                }
            }
        }

        for router in &self.routers {
            let interfaces = used.get(router).cloned().unwrap_or_default();
            if interfaces.iter().copied().ne(0..interfaces.len()) {
                return Err(ConfigError::InterfaceGap(router.clone()));
            }
        }

        for traffic in &self.traffic {
            if !self.hosts.contains(&traffic.from) {
                return Err(ConfigError::UnknownSender(traffic.from.clone()));
            }
        }
        Ok(())
    }

    /// Cost table of `router`, derived from the links it terminates.
    pub fn cost_table(&self, router: &Address) -> CostTable {
        let mut costs = CostTable::new();
        for link in &self.links {
            if &link.a.node == router {
                costs.add_link(link.b.node.clone(), link.a.interface, link.cost);
            }
            if &link.b.node == router {
                costs.add_link(link.a.node.clone(), link.b.interface, link.cost);
            }
        }
        costs
    }
}

/// Host addresses must survive the zero-stripping of the wire format.
fn is_valid_host_address(addr: &Address) -> bool {
    let name = addr.as_str();
    !name.is_empty()
        && name.len() <= crate::packet::DESTINATION_LEN
        && name.bytes().all(|b| b.is_ascii_digit())
        && !name.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(node: &str, interface: usize) -> EndpointConfig {
        EndpointConfig {
            node: Address::from(node),
            interface,
        }
    }

    fn link(a: (&str, usize), b: (&str, usize), cost: Cost) -> LinkConfig {
        LinkConfig {
            a: end(a.0, a.1),
            b: end(b.0, b.1),
            cost,
        }
    }

    fn sample() -> TopologyConfig {
        TopologyConfig {
            settings: SimulationSettings::default(),
            hosts: vec![Address::from("1"), Address::from("2")],
            routers: vec![Address::from("RA"), Address::from("RB")],
            links: vec![
                link(("1", 0), ("RA", 0), 1),
                link(("RA", 1), ("RB", 0), 3),
                link(("RB", 1), ("2", 0), 1),
            ],
            traffic: vec![TrafficConfig {
                from: Address::from("1"),
                to: Address::from("2"),
                payload: "hello".to_string(),
                after_ms: 0,
            }],
        }
    }

    #[test]
    fn test_sample_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn test_cost_table_from_links() {
        let config = sample();
        let costs = config.cost_table(&Address::from("RA"));
        assert_eq!(costs.best_interface(&Address::from("1")), Some((0, 1)));
        assert_eq!(costs.best_interface(&Address::from("RB")), Some((1, 3)));
        assert_eq!(costs.interface_count(), 2);
    }

    #[test]
    fn test_rejects_ambiguous_host_addresses() {
        for bad in ["0", "01", "", "123456", "h1"] {
            let mut config = sample();
            config.hosts.push(Address::from(bad));
            assert_eq!(
                config.validate(),
                Err(ConfigError::InvalidHostAddress(Address::from(bad)))
            );
        }
    }

    #[test]
    fn test_rejects_bad_router_names() {
        let mut config = sample();
        config.routers.push(Address::from("X1"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRouterName(_))));

        let mut config = sample();
        config.routers.push(Address::from("Rlong"));
        assert_eq!(config.validate(), Ok(()));
        config.routers.push(Address::from("Rlonger"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRouterName(_))));
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_nodes() {
        let mut config = sample();
        config.routers.push(Address::from("RA"));
        assert_eq!(config.validate(), Err(ConfigError::DuplicateNode(Address::from("RA"))));

        let mut config = sample();
        config.links.push(link(("RB", 2), ("RZ", 0), 1));
        assert_eq!(config.validate(), Err(ConfigError::UnknownNode(Address::from("RZ"))));
    }

    #[test]
    fn test_rejects_interface_misuse() {
        let mut config = sample();
        config.links.push(link(("RA", 1), ("RB", 2), 1));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InterfaceInUse {
                node: Address::from("RA"),
                interface: 1
            })
        );

        let mut config = sample();
        config.links.push(link(("RA", 3), ("RB", 2), 1));
        assert_eq!(config.validate(), Err(ConfigError::InterfaceGap(Address::from("RA"))));

        let mut config = sample();
        config.links[0] = link(("1", 1), ("RA", 0), 1);
        assert_eq!(config.validate(), Err(ConfigError::HostInterface(Address::from("1"))));
    }

    #[test]
    fn test_rejects_traffic_from_router() {
        let mut config = sample();
        config.traffic[0].from = Address::from("RA");
        assert_eq!(config.validate(), Err(ConfigError::UnknownSender(Address::from("RA"))));
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let json = r#"{
            "settings": { "queue_capacity": 4 },
            "hosts": ["1"],
            "routers": ["RA"],
            "links": [{ "a": { "node": "1", "interface": 0 }, "b": { "node": "RA", "interface": 0 }, "cost": 1 }]
        }"#;
        let config: TopologyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.settings.queue_capacity, 4);
        assert!(config.settings.announce_on_start);
        assert!(config.settings.router_settings().refresh_interval.is_none());
        assert!(config.traffic.is_empty());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("dv-netsim-{}.json", std::process::id()));
        let path = path.to_str().unwrap();
        sample().save(path).unwrap();
        let loaded = TopologyConfig::load(path).unwrap();
        assert_eq!(loaded.links.len(), 3);
        assert_eq!(loaded.traffic[0].payload, "hello");
        let _ = fs::remove_file(path);
    }
}
