//! Per-socket state machine (§4.6): Connected → Identified → Authenticated
//! → Closed. Grounded on `gs2/conn_task.rs`'s handshake-then-`select!`
//! shape — a pre-auth read loop that only understands `Version`/`Login`/
//! `Heartbeat`, handing off into a loop that multiplexes inbound frames,
//! outbound actor broadcasts, the single-session kick signal, and a
//! heartbeat timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::codec::{Connection, Packet};
use crate::config::Config;
use crate::domain::actor::LobbyHandle;
use crate::gateway::ServiceGateway;

use super::handlers::{self, AuthSession};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn handle(
    stream: TcpStream,
    peer: SocketAddr,
    lobby: LobbyHandle,
    gateway: ServiceGateway,
    config: Arc<Config>,
) -> Result<()> {
    let mut conn = Connection::new(stream, config.log_packets);
    info!("accepted connection from {peer}");

    let session = match handshake(&mut conn, peer, &lobby, &gateway, config.port_holepunch).await? {
        Some(session) => session,
        None => {
            conn.shutdown().await;
            return Ok(());
        }
    };

    run_authenticated(conn, session, lobby, gateway).await;
    Ok(())
}

/// Connected/Identified states (§4.6): only `Version`, then `Login` or
/// `Heartbeat`, are meaningful. Anything else — including a second
/// `Version` — closes the socket. Bounded by `LOGIN_TIMEOUT` (§5).
async fn handshake(
    conn: &mut Connection,
    peer: SocketAddr,
    lobby: &LobbyHandle,
    gateway: &ServiceGateway,
    holepunch_port: u16,
) -> Result<Option<AuthSession>> {
    let deadline = Instant::now() + LOGIN_TIMEOUT;
    let mut identified = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("login handshake timed out for {peer}");
            return Ok(None);
        }

        let frame = match tokio::time::timeout(remaining, conn.read_frame()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!("login handshake timed out for {peer}");
                return Ok(None);
            }
        };

        let packet = match frame.decode() {
            Ok(packet) => packet,
            Err(e) => {
                warn!("unrecognized frame before login from {peer}: {e:?}");
                continue;
            }
        };

        match packet {
            Packet::Version(_) if !identified => {
                identified = true;
            }
            Packet::Heartbeat if identified => {}
            Packet::Login(req) if identified => {
                return handlers::handle_login(conn, peer, req, lobby, gateway, holepunch_port)
                    .await
                    .map_err(Into::into);
            }
            other => {
                warn!("unexpected pre-auth packet from {peer}: {other:?}; closing");
                return Ok(None);
            }
        }
    }
}

/// Authenticated state (§4.6, §5): multiplex inbound frames, the actor's
/// outbound broadcasts, the kick signal fired by a later login for the
/// same user (property 3), and the heartbeat timeout.
async fn run_authenticated(
    mut conn: Connection,
    session: AuthSession,
    lobby: LobbyHandle,
    gateway: ServiceGateway,
) {
    let AuthSession {
        user_id,
        mut outbound_rx,
        mut kick_rx,
    } = session;

    let mut heartbeat_deadline = Instant::now() + HEARTBEAT_TIMEOUT;

    loop {
        tokio::select! {
            _ = &mut kick_rx => {
                info!("connection for user {user_id} kicked by a newer login");
                break;
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(packet) => {
                        if let Err(e) = conn.write_packet(&packet).await {
                            warn!("write error to user {user_id}: {e:?}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            frame = conn.read_frame() => {
                match frame {
                    Ok(Some(frame)) => {
                        match frame.decode() {
                            Ok(packet) => {
                                if matches!(packet, Packet::Heartbeat) {
                                    heartbeat_deadline = Instant::now() + HEARTBEAT_TIMEOUT;
                                }
                                if let Err(e) = handlers::dispatch(user_id, packet, &mut conn, &lobby, &gateway).await {
                                    if e.is_fatal() {
                                        warn!("fatal error dispatching for user {user_id}: {e:?}");
                                        break;
                                    }
                                    warn!("handler error for user {user_id}: {e:?}");
                                }
                            }
                            Err(e) => {
                                warn!("dropping unrecognized frame from user {user_id}: {e:?}");
                            }
                        }
                    }
                    Ok(None) => {
                        info!("user {user_id} disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!("frame error from user {user_id}: {e:?}");
                        break;
                    }
                }
            }

            () = tokio::time::sleep_until(heartbeat_deadline) => {
                warn!("heartbeat timeout for user {user_id}");
                break;
            }
        }
    }

    conn.shutdown().await;
    lobby.logout(user_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::actor;
    use crate::domain::channel::ChannelServer;
    use crate::gateway::ServiceGateway;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    fn unreachable_service_config() -> Config {
        Config {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_master: 0,
            port_holepunch: 0,
            log_packets: false,
            user_service_host: "127.0.0.1".into(),
            user_service_port: 1,
            inv_service_host: "127.0.0.1".into(),
            inv_service_port: 1,
        }
    }

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    async fn send_packet(client: &mut TcpStream, packet: &Packet, packet_type: u8) {
        use deku::bitvec::{BitVec, Msb0};
        use deku::prelude::*;
        use tokio::io::AsyncWriteExt;

        let mut bits: BitVec<u8, Msb0> = BitVec::new();
        packet.write(&mut bits, packet_type).unwrap();
        let body = bits.into_vec();
        let body_length = (1 + body.len()) as u16;

        let mut frame = Vec::with_capacity(4 + body_length as usize);
        frame.push(crate::codec::MAGIC);
        frame.push(0);
        frame.extend_from_slice(&body_length.to_le_bytes());
        frame.push(packet_type);
        frame.extend_from_slice(&body);
        client.write_all(&frame).await.unwrap();
    }

    /// A second `Version` before `Login` isn't in §4.6's Connected/Identified
    /// vocabulary, so the handshake gives up and closes rather than looping
    /// forever waiting for a `Login` that will never satisfy the guard.
    #[tokio::test]
    async fn double_version_before_login_closes_the_handshake() {
        use crate::codec::packet::VersionRequest;

        let (server, mut client) = loopback_pair().await;
        let mut conn = Connection::new(server, false);
        let lobby = actor::spawn(ChannelServer::with_default_channels(0));
        let gateway = ServiceGateway::new(&unreachable_service_config());

        let version = Packet::Version(VersionRequest { client_version: 1 });
        send_packet(&mut client, &version, 0x01).await;
        send_packet(&mut client, &version, 0x01).await;

        let outcome = handshake(&mut conn, "127.0.0.1:1".parse().unwrap(), &lobby, &gateway, 30002)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    /// `Heartbeat` before `Version` is likewise out of sequence and closes
    /// the handshake rather than being silently tolerated.
    #[tokio::test]
    async fn heartbeat_before_version_closes_the_handshake() {
        let (server, mut client) = loopback_pair().await;
        let mut conn = Connection::new(server, false);
        let lobby = actor::spawn(ChannelServer::with_default_channels(0));
        let gateway = ServiceGateway::new(&unreachable_service_config());

        send_packet(&mut client, &Packet::Heartbeat, 0x03).await;

        let outcome = handshake(&mut conn, "127.0.0.1:1".parse().unwrap(), &lobby, &gateway, 30002)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    /// A clean EOF before any bytes arrive ends the handshake quietly —
    /// the client just never said anything and went away.
    #[tokio::test]
    async fn disconnect_before_any_frame_closes_the_handshake_quietly() {
        let (server, client) = loopback_pair().await;
        let mut conn = Connection::new(server, false);
        let lobby = actor::spawn(ChannelServer::with_default_channels(0));
        let gateway = ServiceGateway::new(&unreachable_service_config());

        drop(client);

        let outcome = handshake(&mut conn, "127.0.0.1:1".parse().unwrap(), &lobby, &gateway, 30002)
            .await
            .unwrap();
        assert!(outcome.is_none());
    }
}
