//! Config & Bootstrap (C9): CLI flags, required environment validation,
//! and bind-address resolution, folded into one immutable value threaded
//! through every component that needs it (§3, §4.9, §6).

use std::env;
use std::io::IsTerminal;
use std::net::{IpAddr, Ipv4Addr};

use clap::Parser;
use log::warn;

#[derive(Parser, Debug)]
#[command(name = "arenasrv", version, about = "Multiplayer shooter lobby/matchmaking master server")]
struct Cli {
    /// Bind address; default auto-detects the host's non-loopback interface.
    #[arg(short = 'i', long = "ip-address")]
    ip_address: Option<IpAddr>,

    /// TCP listen port for the master protocol.
    #[arg(short = 'p', long = "port-master", default_value_t = 30001)]
    port_master: u16,

    /// UDP port for the holepunch endpoint.
    #[arg(short = 'P', long = "port-holepunch", default_value_t = 30002)]
    port_holepunch: u16,

    /// Log every inbound/outbound frame as a hex dump at debug level.
    #[arg(short = 'l', long = "log-packets")]
    log_packets: bool,
}

/// Process-wide, resolved once at startup (§3). Cheap to clone; every
/// component that needs a setting gets its own copy rather than reaching
/// back into a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub port_master: u16,
    pub port_holepunch: u16,
    pub log_packets: bool,
    pub user_service_host: String,
    pub user_service_port: u16,
    pub inv_service_host: String,
    pub inv_service_port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing or unparsable required environment variable {0}")]
    MissingEnv(&'static str),
}

impl Config {
    /// Parse CLI flags and required environment variables into a resolved
    /// `Config`. `clap`'s own `--help`/`--version`/unknown-flag handling
    /// exits the process with code 0 before this function returns, per
    /// §4.9 step 1.
    pub fn load() -> Result<Config, ConfigError> {
        let cli = Cli::parse();

        let user_service_host = required_env("USERSERVICE_HOST")?;
        let user_service_port = required_env_parsed::<u16>("USERSERVICE_PORT")?;
        let inv_service_host = required_env("INVSERVICE_HOST")?;
        let inv_service_port = required_env_parsed::<u16>("INVSERVICE_PORT")?;

        let bind_ip = cli.ip_address.unwrap_or_else(resolve_bind_ip);

        Ok(Config {
            bind_ip,
            port_master: cli.port_master,
            port_holepunch: cli.port_holepunch,
            log_packets: cli.log_packets,
            user_service_host,
            user_service_port,
            inv_service_host,
            inv_service_port,
        })
    }

    pub fn master_addr(&self) -> (IpAddr, u16) {
        (self.bind_ip, self.port_master)
    }

    pub fn holepunch_addr(&self) -> (IpAddr, u16) {
        (self.bind_ip, self.port_holepunch)
    }

    pub fn user_service_base_url(&self) -> String {
        format!("http://{}:{}", self.user_service_host, self.user_service_port)
    }

    pub fn inventory_service_base_url(&self) -> String {
        format!("http://{}:{}", self.inv_service_host, self.inv_service_port)
    }
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

fn required_env_parsed<T: std::str::FromStr>(name: &'static str) -> Result<T, ConfigError> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or(ConfigError::MissingEnv(name))
}

/// Enumerate local non-loopback interfaces and pick a bind address per
/// §4.9 step 4. A real interactive prompt only makes sense when a human
/// is attached to stdin; under a supervisor (no TTY) this silently takes
/// the first candidate and logs why.
fn resolve_bind_ip() -> IpAddr {
    let candidates = local_non_loopback_addrs();

    match candidates.len() {
        0 => {
            warn!("no non-loopback interface found; falling back to 0.0.0.0");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
        1 => candidates[0],
        _ if std::io::stdin().is_terminal() => prompt_for_address(&candidates),
        _ => {
            warn!(
                "multiple candidate interfaces and no attached terminal; using {} (pass -i to override)",
                candidates[0]
            );
            candidates[0]
        }
    }
}

fn prompt_for_address(candidates: &[IpAddr]) -> IpAddr {
    use std::io::Write;

    println!("Multiple network interfaces found:");
    for (i, addr) in candidates.iter().enumerate() {
        println!("  [{}] {}", i + 1, addr);
    }
    print!("Choose an interface [1-{}]: ", candidates.len());
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_ok() {
        if let Ok(choice) = line.trim().parse::<usize>() {
            if choice >= 1 && choice <= candidates.len() {
                return candidates[choice - 1];
            }
        }
    }

    warn!("no valid selection made; using {}", candidates[0]);
    candidates[0]
}

fn local_non_loopback_addrs() -> Vec<IpAddr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .map(|(_name, addr)| addr)
            .filter(|addr| !addr.is_loopback())
            .collect(),
        Err(_) => Vec::new(),
    }
}
