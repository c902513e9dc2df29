//! Outgoing cross-chain packets
//!
//! A transfer output addressed to `"<chain>/<address>"` is debited locally
//! and recorded here as a packet for the interchain relayer. Packets are
//! numbered from zero per `(source, destination)` chain pair.

use crate::core::coin::Coin;
use crate::core::error::LedgerResult;
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};

/// Packet type for coin transfers
pub const COIN_PACKET: &str = "coin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinsPayload {
    pub address: String,
    pub coins: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub src_chain: String,
    pub dst_chain: String,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub packet_type: String,
    pub payload: CoinsPayload,
}

impl State<'_> {
    /// Next sequence to be assigned for the chain pair
    pub fn egress_sequence(&self, src: &str, dst: &str) -> LedgerResult<u64> {
        Ok(self
            .get_record(&keys::egress_sequence(src, dst))?
            .unwrap_or(0))
    }

    /// Append a coin packet and return it
    pub fn emit_coin_packet(
        &mut self,
        src: &str,
        dst: &str,
        address: &str,
        coins: Coin,
    ) -> LedgerResult<Packet> {
        let sequence = self.egress_sequence(src, dst)?;
        let packet = Packet {
            src_chain: src.to_string(),
            dst_chain: dst.to_string(),
            sequence,
            packet_type: COIN_PACKET.to_string(),
            payload: CoinsPayload {
                address: address.to_string(),
                coins,
            },
        };
        self.set_record(&keys::egress_packet(src, dst, sequence), &packet)?;
        self.set_record(&keys::egress_sequence(src, dst), &(sequence + 1))?;
        log::debug!(
            "ibc packet {}->{} #{} to {} ({})",
            src,
            dst,
            sequence,
            address,
            coins
        );
        Ok(packet)
    }

    pub fn get_packet(&self, src: &str, dst: &str, sequence: u64) -> LedgerResult<Option<Packet>> {
        self.get_record(&keys::egress_packet(src, dst, sequence))
    }

    /// All packets for a chain pair in sequence order
    pub fn packets(&self, src: &str, dst: &str) -> LedgerResult<Vec<Packet>> {
        Ok(self
            .records_with_prefix::<Packet>(&keys::egress_prefix(src, dst))?
            .into_iter()
            .map(|(_, packet)| packet)
            .collect())
    }
}
