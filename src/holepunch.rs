//! Holepunch UDP Endpoint (C8): a receive-and-relay socket that lets two
//! clients behind NAT learn their externally-visible `ip:port` before
//! attempting peer-to-peer match traffic. Holds no state beyond the
//! socket itself (§4.8) — there is nothing here for the `LobbyActor` to
//! own, so unlike the TCP side this is a free function with no domain
//! dependency.

use std::net::SocketAddr;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::net::UdpSocket;

/// Any UDP datagram arriving on this socket gets the sender's observed
/// `ip:port` stamped straight back. The client is expected to send a
/// short handshake stamp (its content is not interpreted server-side —
/// §2's Non-goals explicitly decline to standardize the holepunch
/// payload) and compare what it receives against the address it thinks
/// it has, to discover its NAT mapping.
///
/// Takes an already-bound socket (§4.9 step 7) so a bind failure is the
/// caller's to detect and exit 1 on; anything surfacing from here is a
/// runtime failure (exit 2).
pub async fn run(socket: UdpSocket) -> Result<()> {
    info!("holepunch endpoint listening on {}", socket.local_addr()?);

    let mut buf = [0u8; 512];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("holepunch recv error: {e:?}");
                continue;
            }
        };

        debug!("holepunch stamp from {peer} ({len} bytes)");

        if let Err(e) = reply_with_observed_address(&socket, peer).await {
            warn!("holepunch reply to {peer} failed: {e:?}");
        }
    }
}

async fn reply_with_observed_address(socket: &UdpSocket, peer: SocketAddr) -> Result<()> {
    let payload = encode_observed_address(peer);
    socket.send_to(&payload, peer).await?;
    Ok(())
}

/// 4 bytes of IPv4 octets (or the v4-mapped view of a v6 peer) followed by
/// the 2-byte little-endian port the datagram actually arrived from — the
/// same shape as `UdpHandshakeReply` on the TCP side, so a client that
/// reuses its frame decoder for both paths doesn't need a second format.
fn encode_observed_address(peer: SocketAddr) -> [u8; 6] {
    let ip = match peer.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
    };
    let mut out = [0u8; 6];
    out[..4].copy_from_slice(&ip.octets());
    out[4..].copy_from_slice(&peer.port().to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn encodes_ipv4_octets_and_le_port() {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 40000);
        let encoded = encode_observed_address(peer);
        assert_eq!(&encoded[..4], &[203, 0, 113, 7]);
        assert_eq!(u16::from_le_bytes([encoded[4], encoded[5]]), 40000);
    }
}
