//! Binary LoRa frame sent by the field device.
//!
//! Layout (little-endian, 12 bytes):
//!
//! | bytes | field            | type |
//! |-------|------------------|------|
//! | 0..4  | sender timestamp | u32  |
//! | 4..8  | avg flow rate    | f32  |
//! | 8..12 | std flow rate    | f32  |

use thiserror::Error;

use crate::IngestPayload;

/// Exact frame length in bytes
pub const PACKET_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("invalid binary packet length: {actual} bytes (expected {PACKET_LEN})")]
    InvalidLength { actual: usize },
}

/// A decoded radio frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraPacket {
    /// Milliseconds since the device booted
    pub sender_timestamp: u32,
    pub avg_flow_rate: f32,
    pub std_flow_rate: f32,
}

impl LoraPacket {
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let frame: &[u8; PACKET_LEN] = data
            .try_into()
            .map_err(|_| PacketError::InvalidLength { actual: data.len() })?;

        let word = |at: usize| [frame[at], frame[at + 1], frame[at + 2], frame[at + 3]];

        Ok(Self {
            sender_timestamp: u32::from_le_bytes(word(0)),
            avg_flow_rate: f32::from_le_bytes(word(4)),
            std_flow_rate: f32::from_le_bytes(word(8)),
        })
    }

    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut frame = [0u8; PACKET_LEN];
        frame[0..4].copy_from_slice(&self.sender_timestamp.to_le_bytes());
        frame[4..8].copy_from_slice(&self.avg_flow_rate.to_le_bytes());
        frame[8..12].copy_from_slice(&self.std_flow_rate.to_le_bytes());
        frame
    }

    /// JSON body understood by the receiver
    pub fn to_payload(&self) -> IngestPayload {
        IngestPayload {
            timestamp: self.sender_timestamp,
            avg_flow_rate: self.avg_flow_rate,
            std_flow_rate: self.std_flow_rate,
        }
    }
}
