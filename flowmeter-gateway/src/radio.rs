//! UDP listener for binary frames relayed by the LoRa radio front-end.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use flowmeter_common::{LoraPacket, PacketError};

use crate::config;

/// Receive frames until the socket fails or the forwarder goes away
pub async fn run_radio_listener(
    socket: UdpSocket,
    packet_tx: mpsc::Sender<LoraPacket>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Listening for radio frames on {}", socket.local_addr()?);

    let mut buf = [0u8; config::MAX_FRAME_SIZE];

    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;

        match decode_frame(&buf[..len], from) {
            Ok(packet) => {
                if let Err(e) = packet_tx.send(packet).await {
                    error!("Failed to queue reading: {}", e);
                    break;
                }
            }
            Err(e) => {
                warn!("Discarding frame from {}: {}", from, e);
            }
        }
    }

    Ok(())
}

/// Decode one frame and log its contents
fn decode_frame(data: &[u8], from: SocketAddr) -> Result<LoraPacket, PacketError> {
    debug!("Received binary packet: {} bytes from {}", data.len(), from);

    let packet = LoraPacket::decode(data)?;

    info!(
        "Parsed frame - timestamp: {}, avg flow: {:.3} L/min, std dev: {:.3} L/min",
        packet.sender_timestamp, packet.avg_flow_rate, packet.std_flow_rate
    );
    Ok(packet)
}
