//! Channel / Channel Server (C5): the lobby tree clients browse before
//! creating or joining a Room.

use std::collections::HashMap;

use crate::codec::packet::{ChannelId, ChannelServerId, ChannelSummaryWire, RoomId, RoomSettingsWire, UserId};

use super::room::Room;

pub struct Channel {
    pub channel_id: ChannelId,
    pub name: String,
    rooms: HashMap<RoomId, Room>,
}

impl Channel {
    pub fn new(channel_id: ChannelId, name: impl Into<String>) -> Channel {
        Channel {
            channel_id,
            name: name.into(),
            rooms: HashMap::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    fn insert_room(&mut self, room: Room) {
        self.rooms.insert(room.room_id, room);
    }

    /// Drop a now-empty room. Returns `true` if a room was actually
    /// removed — the caller broadcasts the removal to channel browsers.
    pub fn remove_room(&mut self, room_id: RoomId) -> bool {
        self.rooms.remove(&room_id).is_some()
    }
}

/// A named group of channels advertised to clients on login (§3). `roomId`
/// is unique across every channel in the server, not just within one
/// channel, so the id allocator and the room→channel index both live
/// here rather than on `Channel`.
pub struct ChannelServer {
    pub channel_server_id: ChannelServerId,
    pub channels: Vec<Channel>,
    next_room_id: RoomId,
    room_location: HashMap<RoomId, ChannelId>,
}

impl ChannelServer {
    /// A fixed set of channels, constructed once at startup (§4.9 step 6).
    pub fn with_default_channels(channel_server_id: ChannelServerId) -> ChannelServer {
        let channels = ["Rookie", "Veteran", "Competitive", "Custom"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| Channel::new(i as ChannelId, name))
            .collect();

        ChannelServer {
            channel_server_id,
            channels,
            next_room_id: 1,
            room_location: HashMap::new(),
        }
    }

    pub fn channel(&self, channel_id: ChannelId) -> Option<&Channel> {
        self.channels.get(channel_id as usize)
    }

    pub fn channel_mut(&mut self, channel_id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(channel_id as usize)
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        let channel_id = *self.room_location.get(&room_id)?;
        self.channel(channel_id)?.room(room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        let channel_id = *self.room_location.get(&room_id)?;
        self.channel_mut(channel_id)?.room_mut(room_id)
    }

    /// `createRoom` (§4.5): allocates a server-wide, never-reused
    /// `roomId` and seats `host` as the sole initial member.
    pub fn create_room(
        &mut self,
        channel_id: ChannelId,
        host: UserId,
        name: Option<String>,
        settings: RoomSettingsWire,
    ) -> Option<RoomId> {
        if self.channel(channel_id).is_none() {
            return None;
        }

        let room_id = self.next_room_id;
        self.next_room_id += 1;

        let room = Room::new(room_id, name, settings, host, self.channel_server_id, channel_id);
        self.channel_mut(channel_id).unwrap().insert_room(room);
        self.room_location.insert(room_id, channel_id);
        Some(room_id)
    }

    /// Delete an emptied room and forget its channel mapping.
    pub fn remove_room(&mut self, room_id: RoomId) -> bool {
        let Some(channel_id) = self.room_location.remove(&room_id) else {
            return false;
        };
        match self.channel_mut(channel_id) {
            Some(channel) => channel.remove_room(room_id),
            None => false,
        }
    }

    pub fn summaries(&self) -> Vec<ChannelSummaryWire> {
        self.channels
            .iter()
            .map(|c| ChannelSummaryWire {
                channel_server_id: self.channel_server_id,
                channel_id: c.channel_id,
                name: c.name.as_str().into(),
                current_room_count: c.room_count() as u16,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::room::default_settings;

    #[test]
    fn room_ids_are_unique_across_the_whole_server_not_per_channel() {
        let mut server = ChannelServer::with_default_channels(0);
        let a = server.create_room(0, 1, None, default_settings()).unwrap();
        let b = server.create_room(1, 2, None, default_settings()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn create_room_allocates_monotonic_never_reused_ids() {
        let mut server = ChannelServer::with_default_channels(0);
        let a = server.create_room(0, 1, None, default_settings()).unwrap();
        server.remove_room(a);
        let b = server.create_room(0, 2, None, default_settings()).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn removing_a_room_drops_it_from_the_map_and_location_index() {
        let mut server = ChannelServer::with_default_channels(0);
        let room_id = server.create_room(0, 1, None, default_settings()).unwrap();
        assert!(server.remove_room(room_id));
        assert!(server.room(room_id).is_none());
    }

    #[test]
    fn default_channel_server_has_four_channels() {
        let server = ChannelServer::with_default_channels(0);
        assert_eq!(server.channels.len(), 4);
        assert_eq!(server.summaries().len(), 4);
    }
}
