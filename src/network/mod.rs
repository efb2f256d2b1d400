pub mod interface;
pub mod link;
pub mod topology;

pub use interface::{Direction, Interface, LinkQueue};
pub use link::{Endpoint, Link};
pub use topology::Network;
