//! Error types for the simulator

use crate::types::Address;
use thiserror::Error;

/// Failures turning a packet into wire bytes or back.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("invalid packet kind code {0:?}")]
    InvalidKind(char),

    #[error("destination {0:?} does not fit the 5 byte address field")]
    FieldOverflow(String),

    #[error("unreadable routing payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failures on an interface queue.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("queue is full")]
    Full,
}

/// Topology file problems found while validating it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("node {0} is declared more than once")]
    DuplicateNode(Address),

    #[error("router name {0} must start with 'R' and be at most 5 bytes")]
    InvalidRouterName(Address),

    #[error("host address {0} must be a non-zero decimal of at most 5 digits without leading zeros")]
    InvalidHostAddress(Address),

    #[error("link endpoint {0} is not a declared node")]
    UnknownNode(Address),

    #[error("host {0} only has interface 0")]
    HostInterface(Address),

    #[error("interface {interface} of {node} is used by more than one link")]
    InterfaceInUse { node: Address, interface: usize },

    #[error("interfaces of router {0} must be numbered contiguously from 0")]
    InterfaceGap(Address),

    #[error("traffic source {0} is not a host")]
    UnknownSender(Address),
}
