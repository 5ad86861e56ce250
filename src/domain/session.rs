//! Session Registry (C3): one entry per logged-in user, living only as
//! long as the owning Connection does.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::codec::packet::{ChannelId, ChannelServerId, RoomId, UserId};
use crate::codec::Packet;

/// One authenticated user's in-memory presence (§3). Holds the channel
/// through which the owning connection's outbound frames are delivered —
/// broadcasts and relays write into this directly rather than routing
/// back through the connection task.
pub struct Session {
    pub user_id: UserId,
    pub user_name: String,
    pub external_net: SocketAddr,
    pub current_channel_server_index: ChannelServerId,
    pub current_channel_index: ChannelId,
    pub current_room_id: Option<RoomId>,
    pub last_heartbeat: Instant,
    pub outbound: mpsc::Sender<Packet>,
    /// Fired exactly once, when a later login for the same `userId`
    /// displaces this session (property 3 / the single-session rule).
    /// The owning connection task selects on the paired receiver and
    /// closes its socket as soon as it fires.
    pub kick: oneshot::Sender<()>,
}

impl Session {
    pub fn new(
        user_id: UserId,
        user_name: String,
        external_net: SocketAddr,
        outbound: mpsc::Sender<Packet>,
        kick: oneshot::Sender<()>,
    ) -> Session {
        Session {
            user_id,
            user_name,
            external_net,
            current_channel_server_index: 0,
            current_channel_index: 0,
            current_room_id: None,
            last_heartbeat: Instant::now(),
            outbound,
            kick,
        }
    }

    pub fn is_in_room(&self) -> bool {
        self.current_room_id.is_some()
    }

    /// Send to this session's own connection. Returns `false` on a
    /// full or already-closed outbound queue, which the caller (the
    /// `LobbyActor`, via `broadcast_to_room`/`reap_all`) treats exactly
    /// like a socket write error on the TCP side (§4.4): the member is
    /// pulled from its room and its `Session` dropped, rather than
    /// silently losing the frame.
    pub fn try_send(&self, packet: Packet) -> bool {
        self.outbound.try_send(packet).is_ok()
    }
}
