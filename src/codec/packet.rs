//! Per-opcode packet bodies (C1). Field layouts here are a plausible,
//! internally-consistent encoding of the values the spec calls out — the
//! spec treats the *exact* byte layout of each sub-opcode as an external
//! collaborator contract owned by the game client, not something this
//! design nails down.

use deku::prelude::*;

use super::primitives::{CountedVec, LenString};

pub type UserId = i32;
pub type RoomId = i32;
pub type ChannelId = i16;
pub type ChannelServerId = i16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(type = "u8")]
pub enum ReadyState {
    NotReady = 0,
    Ready = 1,
    InGame = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
pub struct RoomSettingsWire {
    pub game_mode_id: u8,
    pub map_id: u8,
    pub win_limit: u16,
    pub kill_limit: u16,
    pub start_money: u32,
    pub force_camera: u8,
    pub next_map_enabled: u8,
    pub change_teams: u8,
    pub enable_bots: u8,
    pub difficulty: u8,
    pub respawn_time: u8,
    pub team_balance: u8,
    pub weapon_restrictions: u8,
    pub hltv_enabled: u8,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomMemberWire {
    pub user_id: UserId,
    pub team: u8,
    pub ready: ReadyState,
    pub name: LenString,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomSummaryWire {
    pub room_id: RoomId,
    pub name: LenString,
    pub member_count: u8,
    pub max_players: u8,
    pub in_game: u8,
    pub settings: RoomSettingsWire,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct ChannelSummaryWire {
    pub channel_server_id: ChannelServerId,
    pub channel_id: ChannelId,
    pub name: LenString,
    pub current_room_count: u16,
}

// --- inbound request bodies ---------------------------------------------

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct VersionRequest {
    pub client_version: u32,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct LoginRequest {
    pub username: LenString,
    pub password: LenString,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomCreateRequest {
    pub name: LenString,
    pub settings: RoomSettingsWire,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomJoinRequest {
    pub room_id: RoomId,
    pub password: LenString,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomSetUserTeamRequest {
    pub team: u8,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomUpdateSettingsRequest {
    pub settings: RoomSettingsWire,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomSetCountdownRequest {
    pub seconds: u8,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct HostTargetedRequest {
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct FavoriteSetLoadoutRequest {
    pub loadout_index: u8,
    pub slot: u8,
    pub weapon_id: u32,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct FavoriteSetCosmeticsRequest {
    pub slot: u8,
    pub item_id: u32,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct OptionSetBuyMenuRequest {
    pub slot: u8,
    pub weapon_id: u32,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct ChatRequest {
    pub message: LenString,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct UdpHandshakeRequest {
    pub local_port: u16,
}

// --- outbound reply bodies ----------------------------------------------

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct UserStartReply {
    pub user_id: UserId,
    pub username: LenString,
    pub player_name: LenString,
    pub holepunch_port: u16,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct UserInfoReply {
    pub user_id: UserId,
    pub player_name: LenString,
    pub level: u32,
    pub avatar: u32,
    pub cur_exp: u32,
    pub max_exp: u32,
    pub rank: u16,
    pub vip_level: u8,
    pub wins: u32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(type = "u8")]
pub enum InventoryKind {
    Items = 0,
    Cosmetics = 1,
    Loadouts = 2,
    BuyMenu = 3,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct InventoryReply {
    pub kind: InventoryKind,
    pub payload_len: u16,
    #[deku(count = "payload_len")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct ChannelListReply {
    pub channels: CountedVec<ChannelSummaryWire>,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomStateReply {
    pub room_id: RoomId,
    pub name: LenString,
    pub host_user_id: UserId,
    pub max_players: u8,
    pub in_game: u8,
    pub settings: RoomSettingsWire,
    pub members: CountedVec<RoomMemberWire>,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomMemberJoinedReply {
    pub member: RoomMemberWire,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomMemberLeftReply {
    pub user_id: UserId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomSetHostReply {
    pub host_user_id: UserId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomReadyStateReply {
    pub user_id: UserId,
    pub ready: ReadyState,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomCountdownReply {
    pub seconds: u8,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomGameStartReply {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomGameEndReply {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct ChannelRoomRemovedReply {
    pub channel_id: ChannelId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct ChatRelayReply {
    pub from_user_id: UserId,
    pub message: LenString,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct HostInventoryRelayReply {
    pub target_user_id: UserId,
    pub kind: InventoryKind,
    pub payload_len: u16,
    #[deku(count = "payload_len")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(type = "u8")]
pub enum Ack {
    Ok = 0,
    Err = 1,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct SimpleAckReply {
    pub ack: Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(type = "u8")]
pub enum RoomJoinFailureReason {
    NotFound = 0,
    Full = 1,
    WrongPassword = 2,
    AlreadyInRoom = 3,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomJoinAckReply {
    pub ack: Ack,
    pub reason: RoomJoinFailureReason,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct UdpHandshakeReply {
    pub observed_ip: [u8; 4],
    pub observed_port: u16,
}

#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct RoomListReply {
    pub rooms: CountedVec<RoomSummaryWire>,
}

/// The item-unlock ledger (§9, open question): shipped byte-identical to
/// every client between the cosmetics and loadouts frames of the login
/// sequence. Fixed size — see `codec::unlock_blob::UNLOCK_BLOB`.
#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct InventoryUnlockReply {
    pub payload: [u8; 770],
}

/// The opcode-discriminated body. `packet_type` (the frame's 5th byte) is
/// the deku selector; unknown values are not representable here — the
/// frame layer catches those before construction and the Handler Layer
/// logs + drops per §4.1.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, DekuRead, DekuWrite)]
#[deku(ctx = "packet_type: u8", id = "packet_type")]
pub enum Packet {
    // --- client -> server ---
    #[deku(id = "0x01")]
    Version(VersionRequest),
    #[deku(id = "0x02")]
    Login(LoginRequest),
    #[deku(id = "0x03")]
    Heartbeat,
    #[deku(id = "0x04")]
    RoomList,
    #[deku(id = "0x05")]
    RoomCreate(RoomCreateRequest),
    #[deku(id = "0x06")]
    RoomJoin(RoomJoinRequest),
    #[deku(id = "0x07")]
    RoomLeave,
    #[deku(id = "0x08")]
    RoomStart,
    #[deku(id = "0x09")]
    RoomSetUserTeam(RoomSetUserTeamRequest),
    #[deku(id = "0x0A")]
    RoomToggleReady,
    #[deku(id = "0x0B")]
    RoomUpdateSettings(RoomUpdateSettingsRequest),
    #[deku(id = "0x0C")]
    RoomSetCountdown(RoomSetCountdownRequest),
    #[deku(id = "0x0D")]
    RoomConnectionFailure,
    #[deku(id = "0x0E")]
    HostOnGameEnd,
    #[deku(id = "0x0F")]
    HostSetInventory(HostTargetedRequest),
    #[deku(id = "0x10")]
    HostSetLoadout(HostTargetedRequest),
    #[deku(id = "0x11")]
    HostSetBuyMenu(HostTargetedRequest),
    #[deku(id = "0x12")]
    FavoriteSetLoadout(FavoriteSetLoadoutRequest),
    #[deku(id = "0x13")]
    FavoriteSetCosmetics(FavoriteSetCosmeticsRequest),
    #[deku(id = "0x14")]
    OptionSetBuyMenu(OptionSetBuyMenuRequest),
    #[deku(id = "0x15")]
    Chat(ChatRequest),
    #[deku(id = "0x16")]
    Udp(UdpHandshakeRequest),

    // --- server -> client ---
    #[deku(id = "0x81")]
    UserStart(UserStartReply),
    #[deku(id = "0x82")]
    UserInfo(UserInfoReply),
    #[deku(id = "0x83")]
    Inventory(InventoryReply),
    #[deku(id = "0x84")]
    ChannelList(ChannelListReply),
    #[deku(id = "0x85")]
    RoomState(RoomStateReply),
    #[deku(id = "0x86")]
    RoomMemberJoined(RoomMemberJoinedReply),
    #[deku(id = "0x87")]
    RoomMemberLeft(RoomMemberLeftReply),
    #[deku(id = "0x88")]
    RoomSetHost(RoomSetHostReply),
    #[deku(id = "0x89")]
    RoomReadyState(RoomReadyStateReply),
    #[deku(id = "0x8A")]
    RoomCountdown(RoomCountdownReply),
    #[deku(id = "0x8B")]
    RoomGameStart(RoomGameStartReply),
    #[deku(id = "0x8C")]
    RoomGameEnd(RoomGameEndReply),
    #[deku(id = "0x8D")]
    ChannelRoomRemoved(ChannelRoomRemovedReply),
    #[deku(id = "0x8E")]
    ChatRelay(ChatRelayReply),
    #[deku(id = "0x8F")]
    HostInventoryRelay(HostInventoryRelayReply),
    #[deku(id = "0x90")]
    SimpleAck(SimpleAckReply),
    #[deku(id = "0x91")]
    RoomJoinAck(RoomJoinAckReply),
    #[deku(id = "0x92")]
    UdpHandshakeAck(UdpHandshakeReply),
    #[deku(id = "0x93")]
    RoomListResult(RoomListReply),
    #[deku(id = "0x94")]
    InventoryUnlock(InventoryUnlockReply),
}

/// The packet body preceded by its own opcode byte — the part of the
/// frame that comes after `bodyLength` in the wire format (§4.1).
#[derive(Debug, Clone, DekuRead, DekuWrite)]
pub struct PacketBody {
    pub packet_type: u8,
    #[deku(ctx = "packet_type")]
    pub packet: Packet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use deku::bitvec::{BitSlice, BitVec, Msb0};

    #[test]
    fn login_round_trips_through_packet_body() {
        let body = PacketBody {
            packet_type: 0x02,
            packet: Packet::Login(LoginRequest {
                username: "alice".into(),
                password: "hunter2".into(),
            }),
        };

        let mut out: BitVec<u8, Msb0> = BitVec::new();
        body.write(&mut out, ()).unwrap();
        let bytes = out.into_vec();

        let (rest, decoded) = PacketBody::read(BitSlice::from_slice(&bytes), ()).unwrap();
        assert!(rest.is_empty());
        match decoded.packet {
            Packet::Login(req) => {
                assert_eq!(req.username.as_str_lossy(), "alice");
                assert_eq!(req.password.as_str_lossy(), "hunter2");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn heartbeat_has_no_body() {
        let body = PacketBody {
            packet_type: 0x03,
            packet: Packet::Heartbeat,
        };
        let mut out: BitVec<u8, Msb0> = BitVec::new();
        body.write(&mut out, ()).unwrap();
        assert_eq!(out.into_vec(), vec![0x03]);
    }
}
