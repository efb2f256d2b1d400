pub mod config;
pub mod error;
pub mod host;
pub mod network;
pub mod packet;
pub mod protocol;
pub mod router;
pub mod types;

pub use config::TopologyConfig;
pub use error::{CodecError, ConfigError, InterfaceError};
pub use host::{Delivery, Host, HostSender};
pub use network::{Direction, Interface, Network};
pub use packet::{Packet, PacketKind};
pub use protocol::{CostTable, DistanceMatrix, RoutingUpdate};
pub use router::{Forwarding, Router, RouterSettings, RouterStats, RoutingSnapshot};
pub use types::{Address, Cost, UNREACHABLE};
