//! Handler Layer (C7): the login path and the packetType → action dispatch
//! for everything after it. Authorization and gateway calls happen here,
//! in the connection's own task (§5) — the `LobbyActor` only ever sees
//! already-decided commands.

use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::codec::packet::{
    Ack, ChannelSummaryWire, HostInventoryRelayReply, InventoryKind, InventoryReply, LoginRequest,
    RoomJoinAckReply, RoomJoinFailureReason, RoomListReply, SimpleAckReply, UserId, UserInfoReply,
    UserStartReply,
};
use crate::codec::unlock_blob::UNLOCK_BLOB;
use crate::codec::{Connection, Packet};
use crate::domain::actor::{LobbyHandle, LoginOutcome};
use crate::error::HandlerError;
use crate::gateway::{ServiceGateway, User};

/// Handed back to the connection task once login succeeds: everything it
/// needs to run the authenticated `select!` loop.
pub struct AuthSession {
    pub user_id: UserId,
    pub outbound_rx: mpsc::Receiver<Packet>,
    pub kick_rx: oneshot::Receiver<()>,
}

/// §4.7's login path: `validateCredentials` → session creation → the
/// strict outbound sequence (UserStart, UserInfo, the four inventory
/// projections with the unlock blob between cosmetics and loadouts,
/// ChannelList). Returns `Ok(None)` on bad credentials or a gateway
/// outage during validation — both close the socket without a reply
/// beyond whatever was already sent, per §7 "fails soft".
pub async fn handle_login(
    conn: &mut Connection,
    peer: SocketAddr,
    req: LoginRequest,
    lobby: &LobbyHandle,
    gateway: &ServiceGateway,
    holepunch_port: u16,
) -> Result<Option<AuthSession>, HandlerError> {
    let username = req.username.as_str_lossy().to_string();
    let password = req.password.as_str_lossy().to_string();

    let user_id = match gateway.users.validate_credentials(&username, &password).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            info!("login rejected (bad credentials) for {username:?} from {peer}");
            return Ok(None);
        }
        Err(e) => {
            warn!("user service unavailable validating {username:?} from {peer}: {e:?}");
            return Ok(None);
        }
    };

    let user = match gateway.get_user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("user {user_id} validated but has no user-service record; using defaults");
            placeholder_user(user_id, &username)
        }
        Err(e) => {
            warn!("user service unavailable fetching profile for {user_id}: {e:?}");
            placeholder_user(user_id, &username)
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(128);
    let (kick_tx, kick_rx) = oneshot::channel();

    match lobby.login(user_id, username.clone(), peer, outbound_tx, kick_tx).await {
        LoginOutcome::Fresh => info!("user {user_id} logged in from {peer}"),
        LoginOutcome::Replaced => {
            info!("user {user_id} re-logged in from {peer}; prior connection kicked")
        }
    }

    let channels = lobby.list_channels().await;
    send_login_sequence(conn, &user, holepunch_port, gateway, channels).await?;

    Ok(Some(AuthSession {
        user_id,
        outbound_rx,
        kick_rx,
    }))
}

fn placeholder_user(user_id: UserId, username: &str) -> User {
    User {
        user_id,
        user_name: username.to_string(),
        player_name: username.to_string(),
        level: 0,
        avatar: 0,
        cur_exp: 0,
        max_exp: 0,
        rank: 0,
        vip_level: 0,
        wins: 0,
        kills: 0,
        deaths: 0,
        assists: 0,
    }
}

async fn send_login_sequence(
    conn: &mut Connection,
    user: &User,
    holepunch_port: u16,
    gateway: &ServiceGateway,
    channels: Vec<ChannelSummaryWire>,
) -> Result<(), HandlerError> {
    conn.write_packet(&Packet::UserStart(UserStartReply {
        user_id: user.user_id,
        username: user.user_name.as_str().into(),
        player_name: user.player_name.as_str().into(),
        holepunch_port,
    }))
    .await?;

    conn.write_packet(&Packet::UserInfo(UserInfoReply {
        user_id: user.user_id,
        player_name: user.player_name.as_str().into(),
        level: user.level,
        avatar: user.avatar,
        cur_exp: user.cur_exp,
        max_exp: user.max_exp,
        rank: user.rank,
        vip_level: user.vip_level,
        wins: user.wins,
        kills: user.kills,
        deaths: user.deaths,
        assists: user.assists,
    }))
    .await?;

    let items = gateway.inventory.read_items(user.user_id).await.unwrap_or_default();
    conn.write_packet(&inventory_reply(InventoryKind::Items, items)).await?;

    let cosmetics = gateway
        .inventory
        .read_cosmetics(user.user_id)
        .await
        .unwrap_or_default();
    conn.write_packet(&inventory_reply(InventoryKind::Cosmetics, cosmetics)).await?;

    // The unlock ledger (§9, open question) always rides between the
    // cosmetics and loadouts frames.
    conn.write_packet(&Packet::InventoryUnlock(crate::codec::packet::InventoryUnlockReply {
        payload: UNLOCK_BLOB,
    }))
    .await?;

    let loadouts = gateway
        .inventory
        .read_loadouts(user.user_id)
        .await
        .unwrap_or_default();
    conn.write_packet(&inventory_reply(InventoryKind::Loadouts, loadouts)).await?;

    let buy_menu = gateway
        .inventory
        .read_buy_menu(user.user_id)
        .await
        .unwrap_or_default();
    conn.write_packet(&inventory_reply(InventoryKind::BuyMenu, buy_menu)).await?;

    conn.write_packet(&Packet::ChannelList(crate::codec::packet::ChannelListReply {
        channels: channels.into(),
    }))
    .await?;

    Ok(())
}

fn inventory_reply(kind: InventoryKind, payload: Vec<u8>) -> Packet {
    Packet::Inventory(InventoryReply {
        kind,
        payload_len: payload.len() as u16,
        payload,
    })
}

/// Every opcode valid only once authenticated (§4.7). Unknown or
/// pre-auth-only opcodes are logged and dropped, never fatal.
pub async fn dispatch(
    user_id: UserId,
    packet: Packet,
    conn: &mut Connection,
    lobby: &LobbyHandle,
    gateway: &ServiceGateway,
) -> Result<(), HandlerError> {
    match packet {
        Packet::Heartbeat => {
            lobby.heartbeat(user_id).await;
        }

        Packet::RoomList => {
            let rooms = lobby.list_rooms(user_id).await;
            conn.write_packet(&Packet::RoomListResult(RoomListReply { rooms: rooms.into() }))
                .await?;
        }

        Packet::RoomCreate(req) => {
            let name = {
                let raw = req.name.as_str_lossy();
                if raw.is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                }
            };
            match lobby.create_room(user_id, name, req.settings).await {
                Some(state) => conn.write_packet(&Packet::RoomState(state)).await?,
                None => send_simple_ack(conn, false).await?,
            }
        }

        Packet::RoomJoin(req) => {
            let password = req.password.as_str_lossy().to_string();
            match lobby.join_room(user_id, req.room_id, password).await {
                Ok(state) => {
                    // `reason` is unused on the success path; clients key off `ack`.
                    conn.write_packet(&Packet::RoomJoinAck(RoomJoinAckReply {
                        ack: Ack::Ok,
                        reason: RoomJoinFailureReason::NotFound,
                    }))
                    .await?;
                    conn.write_packet(&Packet::RoomState(state)).await?;
                }
                Err(reason) => {
                    conn.write_packet(&Packet::RoomJoinAck(RoomJoinAckReply { ack: Ack::Err, reason }))
                        .await?;
                }
            }
        }

        Packet::RoomLeave => {
            lobby.leave_room(user_id).await;
        }

        Packet::RoomStart => {
            let result = lobby.start_game(user_id).await;
            send_simple_ack(conn, result.is_ok()).await?;
        }

        Packet::RoomSetUserTeam(req) => {
            lobby.set_user_team(user_id, req.team).await;
        }

        Packet::RoomToggleReady => {
            lobby.toggle_ready(user_id).await;
        }

        Packet::RoomUpdateSettings(req) => {
            let result = lobby.update_settings(user_id, req.settings).await;
            send_simple_ack(conn, result.is_ok()).await?;
        }

        Packet::RoomSetCountdown(req) => {
            let result = lobby.set_countdown(user_id, req.seconds).await;
            send_simple_ack(conn, result.is_ok()).await?;
        }

        Packet::RoomConnectionFailure => {
            lobby.leave_room(user_id).await;
        }

        Packet::HostOnGameEnd => {
            let result = lobby.host_on_game_end(user_id).await;
            send_simple_ack(conn, result.is_ok()).await?;
        }

        Packet::HostSetInventory(req) => {
            relay_host_inventory(user_id, req.target_user_id, InventoryKind::Items, conn, lobby, gateway).await?;
        }
        Packet::HostSetLoadout(req) => {
            relay_host_inventory(user_id, req.target_user_id, InventoryKind::Loadouts, conn, lobby, gateway)
                .await?;
        }
        Packet::HostSetBuyMenu(req) => {
            relay_host_inventory(user_id, req.target_user_id, InventoryKind::BuyMenu, conn, lobby, gateway)
                .await?;
        }

        // Fire-and-forget write-throughs (§9): no reply, so the
        // sequence counter the client tracks is never perturbed.
        Packet::FavoriteSetLoadout(req) => {
            if let Err(e) = gateway
                .inventory
                .write_loadout_weapon(user_id, req.loadout_index, req.slot, req.weapon_id)
                .await
            {
                warn!("favorite set-loadout write failed for user {user_id}: {e:?}");
            }
        }
        Packet::FavoriteSetCosmetics(req) => {
            if let Err(e) = gateway.inventory.write_cosmetic_slot(user_id, req.slot, req.item_id).await {
                warn!("favorite set-cosmetics write failed for user {user_id}: {e:?}");
            }
        }
        Packet::OptionSetBuyMenu(req) => {
            if let Err(e) = gateway.inventory.write_buy_menu_slot(user_id, req.slot, req.weapon_id).await {
                warn!("option set-buy-menu write failed for user {user_id}: {e:?}");
            }
        }

        Packet::Chat(req) => {
            lobby.chat(user_id, req.message.as_str_lossy().to_string()).await;
        }

        Packet::Udp(req) => {
            debug!("udp handshake advertisement from user {user_id}, local_port={}", req.local_port);
        }

        Packet::Version(_) | Packet::Login(_) => {
            warn!("user {user_id} resent a pre-auth-only packet; dropping");
        }

        other => {
            warn!("unhandled authenticated packet from user {user_id}: {other:?}");
        }
    }

    Ok(())
}

async fn send_simple_ack(conn: &mut Connection, ok: bool) -> Result<(), HandlerError> {
    let ack = if ok { Ack::Ok } else { Ack::Err };
    conn.write_packet(&Packet::SimpleAck(SimpleAckReply { ack })).await?;
    Ok(())
}

/// The host-proxied inventory relay (§4.4): authorization chain a..e lives
/// entirely in `LobbyHandle::check_host_authority`; on success, this fetches
/// the target's projection and delivers it to the *requester's* (the
/// host's) own connection. Any failure — authorization or gateway — is
/// logged and the packet dropped; the socket stays open either way.
async fn relay_host_inventory(
    requester: UserId,
    target: UserId,
    kind: InventoryKind,
    conn: &mut Connection,
    lobby: &LobbyHandle,
    gateway: &ServiceGateway,
) -> Result<(), HandlerError> {
    if let Err(e) = lobby.check_host_authority(requester, target).await {
        warn!("host inventory relay denied: requester={requester} target={target}: {e:?}");
        return Ok(());
    }

    let payload = match kind {
        InventoryKind::Items => gateway.inventory.read_items(target).await,
        InventoryKind::Cosmetics => gateway.inventory.read_cosmetics(target).await,
        InventoryKind::Loadouts => gateway.inventory.read_loadouts(target).await,
        InventoryKind::BuyMenu => gateway.inventory.read_buy_menu(target).await,
    };

    let payload = match payload {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("inventory relay fetch failed for target {target}: {e:?}");
            return Ok(());
        }
    };

    conn.write_packet(&Packet::HostInventoryRelay(HostInventoryRelayReply {
        target_user_id: target,
        kind,
        payload_len: payload.len() as u16,
        payload,
    }))
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::actor;
    use crate::domain::channel::ChannelServer;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn placeholder_user_uses_username_for_both_name_fields() {
        let user = placeholder_user(7, "shep");
        assert_eq!(user.user_id, 7);
        assert_eq!(user.user_name, "shep");
        assert_eq!(user.player_name, "shep");
        assert_eq!(user.level, 0);
        assert_eq!(user.vip_level, 0);
    }

    /// A host service that refuses every connection so `validate_credentials`
    /// fails fast with a `GatewayError` instead of hanging on a real network
    /// call (no mock HTTP server in this dependency stack).
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

    #[tokio::test]
    async fn login_with_unreachable_user_service_is_rejected_without_panicking() {
        let (server_stream, _client_stream) = loopback_pair().await;

        let mut conn = Connection::new(server_stream, false);
        let gateway = ServiceGateway::new(&unreachable_service_config());
        let lobby = actor::spawn(ChannelServer::with_default_channels(0));

        let req = LoginRequest {
            username: "shep".into(),
            password: "wrong".into(),
        };
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let outcome = handle_login(&mut conn, peer, req, &lobby, &gateway, 30002).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn host_inventory_relay_without_a_session_is_denied_and_never_panics() {
        let (server, client) = loopback_pair().await;

        let mut conn = Connection::new(server, false);
        let gateway = ServiceGateway::new(&unreachable_service_config());
        let lobby = actor::spawn(ChannelServer::with_default_channels(0));

        // Neither `requester` nor `target` has ever logged in, so
        // `check_host_authority` rejects before any gateway call happens.
        let result = relay_host_inventory(1, 2, InventoryKind::Items, &mut conn, &lobby, &gateway).await;
        assert!(result.is_ok());
        drop(client);
    }
}
