use thiserror::Error;

/// Errors that can come out of the frame codec (C1). Always fatal to the
/// connection that produced them.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("bad magic byte: expected 0x55, got {0:#04x}")]
    BadMagic(u8),
    #[error("frame body of {0} bytes exceeds MAX_BODY ({1})")]
    TooLarge(usize, usize),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Deku(#[from] deku::DekuError),
}

/// Errors surfacing from the Service Gateway (C2). Never fatal to a
/// connection: callers fold these into "absent" / "fails soft" per §7.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{service} is not currently reachable")]
    Unavailable { service: &'static str },
    #[error("request to {service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} responded with status {status}")]
    Status { service: &'static str, status: u16 },
    #[error("failed to decode response from {service}: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Authorization failures (C7). Logged at `warn`, the offending packet is
/// dropped, and the socket is left open.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no session bound to this connection")]
    NoSession,
    #[error("requester is not in a room")]
    NotInRoom,
    #[error("target user has no active session")]
    TargetAbsent,
    #[error("requester is not the room host")]
    NotHost,
    #[error("target is not a member of the requester's room")]
    TargetNotInRoom,
}

/// Composed error type returned by handlers. Protocol-fatal variants
/// propagate up to the connection task and close the socket; the rest are
/// logged and swallowed.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Authz(#[from] AuthzError),
    #[error("protocol violation: {0}")]
    ProtocolFatal(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Whether this error must close the owning connection, per the §7
    /// taxonomy (protocol-fatal only; authorization/gateway failures do not).
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Frame(_) | HandlerError::ProtocolFatal(_))
    }
}
