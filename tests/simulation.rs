use dv_netsim::config::{EndpointConfig, LinkConfig, SimulationSettings};
use dv_netsim::{Address, Network, TopologyConfig};
use std::time::Duration;

fn addr(name: &str) -> Address {
    Address::from(name)
}

fn link(a: (&str, usize), b: (&str, usize), cost: u32) -> LinkConfig {
    LinkConfig {
        a: EndpointConfig {
            node: addr(a.0),
            interface: a.1,
        },
        b: EndpointConfig {
            node: addr(b.0),
            interface: b.1,
        },
        cost,
    }
}

fn topology(name: &str) -> TopologyConfig {
    let path = format!("{}/topologies/{}", env!("CARGO_MANIFEST_DIR"), name);
    TopologyConfig::load(&path).unwrap()
}

async fn wait_for_deliveries(network: &mut Network, count: usize) -> Vec<dv_netsim::Delivery> {
    let mut deliveries = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while deliveries.len() < count {
            deliveries.extend(network.drain_deliveries());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("deliveries did not arrive in time");
    deliveries
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_routers_converge() {
    let config = TopologyConfig {
        settings: SimulationSettings::default(),
        hosts: Vec::new(),
        routers: vec![addr("R1"), addr("R2"), addr("R3")],
        links: vec![link(("R1", 0), ("R2", 0), 3), link(("R2", 1), ("R3", 0), 2)],
        traffic: Vec::new(),
    };
    let network = Network::start(&config).unwrap();
    assert!(network.settle(Duration::from_millis(100), Duration::from_secs(5)).await);

    let r1 = network.snapshot(&addr("R1")).unwrap();
    assert_eq!(r1.table.get(&addr("R3"), &addr("R1")), Some(5));
    assert_eq!(r1.table.get(&addr("R2"), &addr("R1")), Some(3));

    let r3 = network.snapshot(&addr("R3")).unwrap();
    assert_eq!(r3.table.get(&addr("R1"), &addr("R3")), Some(5));

    let (snapshots, deliveries) = network.shutdown().await;
    assert_eq!(snapshots.len(), 3);
    assert!(deliveries.is_empty());
    assert!(snapshots.iter().all(|s| s.stats.forwarded == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_line_delivers_host_traffic() {
    let config = topology("line.json");
    let mut network = Network::start(&config).unwrap();
    network.inject(&config.traffic).unwrap();

    let deliveries = wait_for_deliveries(&mut network, 1).await;
    assert_eq!(deliveries[0].host, addr("2"));
    assert_eq!(deliveries[0].payload, "Sample client data");

    let (snapshots, _) = network.shutdown().await;
    let ra = snapshots.iter().find(|s| s.router == addr("RA")).unwrap();
    assert_eq!(ra.table.get(&addr("2"), &addr("RA")), Some(2));
    assert_eq!(ra.stats.forwarded, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_diamond_takes_cheapest_path() {
    let mut config = topology("diamond.json");
    config.settings.refresh_interval_ms = 0;
    let mut network = Network::start(&config).unwrap();
    assert!(network.settle(Duration::from_millis(100), Duration::from_secs(5)).await);

    let ra = network.snapshot(&addr("RA")).unwrap();
    assert_eq!(ra.table.get(&addr("RD"), &addr("RA")), Some(2));
    assert_eq!(ra.table.get(&addr("2"), &addr("RA")), Some(3));
    let rd = network.snapshot(&addr("RD")).unwrap();
    assert_eq!(rd.table.get(&addr("1"), &addr("RD")), Some(3));

    network.send(&addr("1"), addr("2"), "over RB").await.unwrap();
    network.send(&addr("2"), addr("1"), "back").await.unwrap();
    let mut deliveries = wait_for_deliveries(&mut network, 2).await;
    deliveries.sort_by(|a, b| a.host.cmp(&b.host));
    assert_eq!(deliveries[0].payload, "back");
    assert_eq!(deliveries[1].payload, "over RB");

    let (snapshots, _) = network.shutdown().await;
    let rc = snapshots.iter().find(|s| s.router == addr("RC")).unwrap();
    assert_eq!(rc.stats.forwarded, 0);
    let rb = snapshots.iter().find(|s| s.router == addr("RB")).unwrap();
    assert_eq!(rb.stats.forwarded, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_does_not_disturb_converged_tables() {
    let mut config = topology("diamond.json");
    config.settings.refresh_interval_ms = 50;
    let network = Network::start(&config).unwrap();
    assert!(network.settle(Duration::from_millis(150), Duration::from_secs(5)).await);
    let before: Vec<_> = network.snapshots().into_iter().map(|s| s.table).collect();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let (snapshots, _) = network.shutdown().await;
    let after: Vec<_> = snapshots.iter().map(|s| s.table.clone()).collect();
    assert_eq!(before, after);
    assert!(snapshots.iter().all(|s| s.stats.updates_ignored > 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unrouted_destination_is_dropped() {
    let config = topology("line.json");
    let mut network = Network::start(&config).unwrap();
    assert!(network.settle(Duration::from_millis(100), Duration::from_secs(5)).await);

    network.send(&addr("1"), addr("7"), "nowhere").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(network.drain_deliveries().is_empty());

    let (snapshots, _) = network.shutdown().await;
    let ra = snapshots.iter().find(|s| s.router == addr("RA")).unwrap();
    assert_eq!(ra.stats.dropped_no_route, 1);
}
