pub mod messages;
pub mod routing_table;

pub use messages::*;
pub use routing_table::*;
