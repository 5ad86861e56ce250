//! Connection (C6) + Handler Layer (C7): the TCP accept loop and
//! everything that happens on one accepted socket. Grounded on
//! `login_server.rs`'s accept-loop-plus-spawn shape — no TLS here, since
//! nothing in this protocol asks for it on the master port.

mod connection;
mod handlers;

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::domain::actor::LobbyHandle;
use crate::gateway::ServiceGateway;

/// Runs the accept loop on an already-bound listener (§4.9 step 7) — bind
/// failures are the caller's to detect and exit 1 on; anything surfacing
/// from here is a runtime failure (exit 2).
pub async fn run(
    listener: TcpListener,
    lobby: LobbyHandle,
    gateway: ServiceGateway,
    config: Arc<Config>,
) -> Result<()> {
    info!("master protocol listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        let lobby = lobby.clone();
        let gateway = gateway.clone();
        let config = Arc::clone(&config);

        tokio::spawn(async move {
            if let Err(e) = connection::handle(stream, peer, lobby, gateway, config).await {
                error!("connection from {peer} failed: {e:?}");
            }
        });
    }
}
