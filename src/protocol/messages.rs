use super::DistanceMatrix;
use crate::error::CodecError;
use crate::packet::{Packet, PacketKind};
use crate::types::Address;

/// Routing update carried by a control packet: the sender's whole matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingUpdate {
    pub change: bool,
    pub table: DistanceMatrix,
}

impl RoutingUpdate {
    pub fn new(table: DistanceMatrix, change: bool) -> Self {
        Self { change, table }
    }

    pub fn to_packet(&self, destination: Address) -> Result<Packet, CodecError> {
        let payload = serde_json::to_vec(&self.table)?;
        Ok(Packet::control(destination, self.change, payload))
    }

    pub fn from_packet(packet: &Packet) -> Result<Self, CodecError> {
        if packet.kind != PacketKind::Control {
            return Err(CodecError::InvalidKind(packet.kind.code() as char));
        }
        let table = serde_json::from_slice(&packet.payload)?;
        Ok(Self {
            change: packet.change,
            table,
        })
    }
}
