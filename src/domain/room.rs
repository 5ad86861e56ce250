//! Room (C4): one lobby room's membership, settings, and state machine.

use std::collections::HashMap;

use thiserror::Error;

use crate::codec::packet::{ChannelId, ChannelServerId, ReadyState, RoomId, RoomSettingsWire, UserId};

/// The client's expected defaults for an unspecified setting (§4.4). Kept
/// as a free function rather than a `Default` impl so it reads as "the
/// lobby's defaults" rather than "whatever `RoomSettingsWire` defaults
/// to" — the two coincide today but are conceptually different contracts.
pub fn default_settings() -> RoomSettingsWire {
    RoomSettingsWire {
        game_mode_id: 0,
        map_id: 1,
        win_limit: 10,
        kill_limit: 150,
        start_money: 16000,
        force_camera: 1,
        next_map_enabled: 0,
        change_teams: 0,
        enable_bots: 0,
        difficulty: 0,
        respawn_time: 3,
        team_balance: 0,
        weapon_restrictions: 0,
        hltv_enabled: 0,
    }
}

pub fn max_players_for(settings: &RoomSettingsWire) -> u8 {
    if settings.enable_bots != 0 {
        16
    } else {
        32
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("room is full")]
    Full,
    #[error("user already belongs to a room")]
    AlreadyInRoom,
    #[error("requester is not the room host")]
    NotHost,
    #[error("room is currently in-game")]
    InGame,
    #[error("not all members are ready")]
    NotAllReady,
    #[error("room is not in-game")]
    NotInGame,
}

/// Outcome of removing a member, telling the caller (the `Channel`/actor)
/// what fan-out, if any, is still owed.
pub enum RemoveOutcome {
    /// Room is now empty; caller deletes it and notifies channel browsers.
    RoomEmptied,
    /// Room still has members and the host changed as a result.
    HostChanged(UserId),
    /// Room still has members and the host did not change.
    Unchanged,
}

pub struct Room {
    pub room_id: RoomId,
    pub name: String,
    pub settings: RoomSettingsWire,
    pub host_user_id: UserId,
    pub members: Vec<UserId>,
    pub max_players: u8,
    pub ready: HashMap<UserId, ReadyState>,
    pub teams: HashMap<UserId, u8>,
    pub countdown_seconds: Option<u8>,
    pub in_game: bool,
    pub channel_server_id: ChannelServerId,
    pub channel_id: ChannelId,
    /// None unless a future room-creation opcode grows a password field;
    /// `RoomCreateRequest` doesn't carry one today, so this is always
    /// unset in practice but `RoomJoinRequest.password` is still checked
    /// against it for forward compatibility with `RoomJoinFailureReason::WrongPassword`.
    pub password: Option<String>,
}

impl Room {
    pub fn new(
        room_id: RoomId,
        name: Option<String>,
        settings: RoomSettingsWire,
        host_user_id: UserId,
        channel_server_id: ChannelServerId,
        channel_id: ChannelId,
    ) -> Room {
        let mut ready = HashMap::new();
        ready.insert(host_user_id, ReadyState::NotReady);
        let mut teams = HashMap::new();
        teams.insert(host_user_id, 0);

        Room {
            room_id,
            name: name.unwrap_or_else(|| format!("Room #{room_id}")),
            max_players: max_players_for(&settings),
            settings,
            host_user_id,
            members: vec![host_user_id],
            ready,
            teams,
            countdown_seconds: None,
            in_game: false,
            channel_server_id,
            channel_id,
            password: None,
        }
    }

    pub fn check_password(&self, given: &str) -> bool {
        match &self.password {
            Some(expected) => expected == given,
            None => true,
        }
    }

    pub fn has_free_slot(&self) -> bool {
        self.members.len() < self.max_players as usize
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    pub fn is_host(&self, user_id: UserId) -> bool {
        self.host_user_id == user_id
    }

    /// §4.4 `addUser`. Caller has already checked the user isn't in
    /// another room; this only enforces the slot bound (property 4).
    pub fn add_user(&mut self, user_id: UserId) -> Result<(), RoomError> {
        if !self.has_free_slot() {
            return Err(RoomError::Full);
        }
        self.members.push(user_id);
        self.ready.insert(user_id, ReadyState::NotReady);
        self.teams.insert(user_id, 0);
        Ok(())
    }

    /// §4.4 `removeUser` / host election. FIFO by join order (property 6):
    /// the new host is whoever is now at index 0.
    pub fn remove_user(&mut self, user_id: UserId) -> RemoveOutcome {
        let Some(pos) = self.members.iter().position(|&m| m == user_id) else {
            return RemoveOutcome::Unchanged;
        };
        self.members.remove(pos);
        self.ready.remove(&user_id);
        self.teams.remove(&user_id);

        if self.members.is_empty() {
            return RemoveOutcome::RoomEmptied;
        }

        if self.host_user_id == user_id {
            self.host_user_id = self.members[0];
            RemoveOutcome::HostChanged(self.host_user_id)
        } else {
            RemoveOutcome::Unchanged
        }
    }

    pub fn set_ready(&mut self, user_id: UserId, flag: bool) {
        if let Some(state) = self.ready.get_mut(&user_id) {
            *state = if flag { ReadyState::Ready } else { ReadyState::NotReady };
        }
    }

    /// Returns `true` if `user_id` is a member whose team was updated.
    pub fn set_team(&mut self, user_id: UserId, team: u8) -> bool {
        match self.teams.get_mut(&user_id) {
            Some(t) => {
                *t = team;
                true
            }
            None => false,
        }
    }

    pub fn team_of(&self, user_id: UserId) -> u8 {
        *self.teams.get(&user_id).unwrap_or(&0)
    }

    /// Property 8: applying this twice restores the prior state.
    pub fn toggle_ready(&mut self, user_id: UserId) -> Option<ReadyState> {
        let state = self.ready.get_mut(&user_id)?;
        *state = match *state {
            ReadyState::NotReady => ReadyState::Ready,
            ReadyState::Ready => ReadyState::NotReady,
            ReadyState::InGame => ReadyState::InGame,
        };
        Some(*state)
    }

    pub fn all_ready(&self) -> bool {
        self.members
            .iter()
            .all(|m| matches!(self.ready.get(m), Some(ReadyState::Ready)))
    }

    pub fn start_game(&mut self, requester: UserId) -> Result<(), RoomError> {
        if requester != self.host_user_id {
            return Err(RoomError::NotHost);
        }
        if !self.all_ready() {
            return Err(RoomError::NotAllReady);
        }
        self.in_game = true;
        for state in self.ready.values_mut() {
            *state = ReadyState::InGame;
        }
        Ok(())
    }

    pub fn end_game(&mut self) -> Result<(), RoomError> {
        if !self.in_game {
            return Err(RoomError::NotInGame);
        }
        self.in_game = false;
        self.countdown_seconds = None;
        for state in self.ready.values_mut() {
            *state = ReadyState::NotReady;
        }
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        requester: UserId,
        settings: RoomSettingsWire,
    ) -> Result<(), RoomError> {
        if requester != self.host_user_id {
            return Err(RoomError::NotHost);
        }
        if self.in_game {
            return Err(RoomError::InGame);
        }
        self.max_players = max_players_for(&settings);
        self.settings = settings;
        Ok(())
    }

    pub fn set_countdown(&mut self, requester: UserId, seconds: u8) -> Result<(), RoomError> {
        if requester != self.host_user_id {
            return Err(RoomError::NotHost);
        }
        if self.in_game {
            return Err(RoomError::InGame);
        }
        self.countdown_seconds = if seconds == 0 { None } else { Some(seconds) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with_members(members: &[UserId]) -> Room {
        let mut room = Room::new(1, None, default_settings(), members[0], 0, 0);
        for &m in &members[1..] {
            room.add_user(m).unwrap();
        }
        room
    }

    #[test]
    fn default_settings_match_spec() {
        let s = default_settings();
        assert_eq!(s.game_mode_id, 0);
        assert_eq!(s.map_id, 1);
        assert_eq!(s.win_limit, 10);
        assert_eq!(s.kill_limit, 150);
        assert_eq!(s.start_money, 16000);
        assert_eq!(s.force_camera, 1);
        assert_eq!(s.respawn_time, 3);
    }

    #[test]
    fn room_name_defaults_to_room_hash_id() {
        let room = Room::new(7, None, default_settings(), 1, 0, 0);
        assert_eq!(room.name, "Room #7");
    }

    #[test]
    fn enable_bots_yields_sixteen_max_players() {
        let mut settings = default_settings();
        settings.enable_bots = 1;
        let room = Room::new(1, None, settings, 1, 0, 0);
        assert_eq!(room.max_players, 16);
    }

    #[test]
    fn host_election_is_fifo() {
        let mut room = room_with_members(&[1, 2, 3, 4]);
        match room.remove_user(1) {
            RemoveOutcome::HostChanged(new_host) => assert_eq!(new_host, 2),
            _ => panic!("expected host change"),
        }
        assert_eq!(room.host_user_id, 2);
    }

    #[test]
    fn removing_last_member_empties_room() {
        let mut room = room_with_members(&[1]);
        assert!(matches!(room.remove_user(1), RemoveOutcome::RoomEmptied));
        assert!(room.members.is_empty());
    }

    #[test]
    fn toggle_ready_twice_restores_prior_state() {
        let mut room = room_with_members(&[1, 2]);
        let original = *room.ready.get(&1).unwrap();
        room.toggle_ready(1);
        room.toggle_ready(1);
        assert_eq!(*room.ready.get(&1).unwrap(), original);
    }

    #[test]
    fn start_game_requires_host_and_all_ready() {
        let mut room = room_with_members(&[1, 2]);
        assert_eq!(room.start_game(2), Err(RoomError::NotHost));
        assert_eq!(room.start_game(1), Err(RoomError::NotAllReady));

        room.set_ready(1, true);
        room.set_ready(2, true);
        assert!(room.start_game(1).is_ok());
        assert!(room.in_game);
    }

    #[test]
    fn end_game_resets_readiness() {
        let mut room = room_with_members(&[1, 2]);
        room.set_ready(1, true);
        room.set_ready(2, true);
        room.start_game(1).unwrap();

        assert!(room.end_game().is_ok());
        assert!(!room.in_game);
        assert_eq!(*room.ready.get(&1).unwrap(), ReadyState::NotReady);
        assert_eq!(*room.ready.get(&2).unwrap(), ReadyState::NotReady);
    }

    #[test]
    fn add_user_respects_slot_bound() {
        let mut settings = default_settings();
        settings.enable_bots = 1; // 16 slots
        let mut room = Room::new(1, None, settings, 1, 0, 0);
        for uid in 2..16 {
            room.add_user(uid).unwrap();
        }
        assert_eq!(room.members.len(), 16);
        assert_eq!(room.add_user(999), Err(RoomError::Full));
    }
}
