use anyhow::Result;
use clap::Parser;
use dv_netsim::{Network, TopologyConfig};
use log::{LevelFilter, info, warn};
use std::time::Duration;
use tokio::runtime::Builder;

#[derive(Parser)]
#[command(name = "dv-netsim", about = "Distance-vector network simulator")]
struct Cli {
    /// Topology file (JSON)
    #[arg(long, short)]
    topology: String,

    /// How long to run the simulation, in milliseconds
    #[arg(long, default_value_t = 2000)]
    duration_ms: u64,

    /// Override the queue capacity of every interface (0 is unbounded)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Print the final tables as JSON instead of grids
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match cli.verbose {
        0 => {}
        1 => {
            logger.filter_level(LevelFilter::Info);
        }
        _ => {
            logger.filter_level(LevelFilter::Debug);
        }
    }
    logger.init();

    let mut config = TopologyConfig::load(&cli.topology)?;
    if let Some(capacity) = cli.queue_capacity {
        config.settings.queue_capacity = capacity;
    }
    info!("loaded topology from {}", cli.topology);

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let mut network = Network::start(&config)?;
        network.inject(&config.traffic)?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(cli.duration_ms)) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping early");
            }
        }

        let (snapshots, deliveries) = network.shutdown().await;

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
            return Ok(());
        }

        for snapshot in &snapshots {
            println!("{}", snapshot);
            println!(
                "forwarded={} no_route={} full={} malformed={} updates={} ignored={} advertisements={}\n",
                snapshot.stats.forwarded,
                snapshot.stats.dropped_no_route,
                snapshot.stats.dropped_full,
                snapshot.stats.malformed,
                snapshot.stats.updates_received,
                snapshot.stats.updates_ignored,
                snapshot.stats.advertisements
            );
        }

        println!("Deliveries: {}", deliveries.len());
        for delivery in &deliveries {
            println!(
                "  {} {} \"{}\"",
                delivery.received_at.format("%H:%M:%S%.3f"),
                delivery.host,
                delivery.payload
            );
        }
        Ok(())
    })
}
