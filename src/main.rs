use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use log::error;
use tokio::net::{TcpListener, UdpSocket};

mod codec;
mod config;
mod domain;
mod error;
mod gateway;
mod holepunch;
mod server;

use config::Config;
use domain::actor;
use domain::channel::ChannelServer;
use gateway::ServiceGateway;

const DEFAULT_CHANNEL_SERVER_ID: i16 = 0;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    // §4.9 steps 1-4: CLI flags, required env vars, bind-address resolution.
    // clap itself handles --help/--version/unknown-flag with an exit(0)
    // before Config::load ever returns.
    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    // §4.9 step 5: gateway + liveness pingers.
    let gateway = ServiceGateway::new(&config);
    gateway.spawn_pingers();

    // §4.9 step 6: channel tree + the single lobby actor.
    let channel_server = ChannelServer::with_default_channels(DEFAULT_CHANNEL_SERVER_ID);
    let lobby = actor::spawn(channel_server);

    // §4.9 step 7: bind both sockets before anything runs, so a bind
    // failure exits 1 rather than surfacing through the run loops as 2.
    let master_addr: SocketAddr = config.master_addr().into();
    let holepunch_addr: SocketAddr = config.holepunch_addr().into();

    let listener = match TcpListener::bind(master_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind master protocol socket on {master_addr}: {e}");
            return ExitCode::from(1);
        }
    };

    let udp_socket = match UdpSocket::bind(holepunch_addr).await {
        Ok(socket) => socket,
        Err(e) => {
            error!("failed to bind holepunch socket on {holepunch_addr}: {e}");
            return ExitCode::from(1);
        }
    };

    let master = tokio::spawn(server::run(listener, lobby.clone(), gateway.clone(), Arc::clone(&config)));
    let punch = tokio::spawn(holepunch::run(udp_socket));

    let (master, punch) = tokio::join!(master, punch);

    if let Err(e) = master.expect("master protocol task should not panic") {
        error!("master protocol server exited with an error: {e:?}");
        return ExitCode::from(2);
    }
    if let Err(e) = punch.expect("holepunch task should not panic") {
        error!("holepunch endpoint exited with an error: {e:?}");
        return ExitCode::from(2);
    }

    ExitCode::SUCCESS
}
