//! Lobby domain model: Session Registry (C3), Room (C4), Channel /
//! Channel Server (C5), composed into the single `LobbyActor` (§5's
//! "Chosen implementation model") that owns every mutable piece of it.

pub mod actor;
pub mod channel;
pub mod room;
pub mod session;
