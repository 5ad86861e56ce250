//! The "unlock" byte blob (§9, open question): an opaque, fixed-size
//! ledger sent byte-identical to every client on login, between the
//! cosmetics and loadout inventory frames. Its internal structure is not
//! decoded here — see DESIGN.md for the reasoning.

pub const UNLOCK_BLOB: [u8; 770] = [0u8; 770];
