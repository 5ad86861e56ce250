//! The framed binary session protocol (C1): magic/sequence/length/opcode
//! envelope, per-opcode bodies, and the primitives they're built from.

pub mod frame;
pub mod packet;
pub mod primitives;
pub mod unlock_blob;

pub use frame::{Connection, RawFrame, MAGIC, MAX_BODY};
pub use packet::Packet;
