//! Environment variable configuration shared by client and server.
//!
//! The client reads `server15440` (IPv4 address) and `serverport15440`
//! (TCP port); the server reads only the port. Missing or unparseable
//! values fall back to the defaults with a log line, they are never
//! fatal.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const SERVER_ADDR_ENV: &str = "server15440";
pub const SERVER_PORT_ENV: &str = "serverport15440";

pub const DEFAULT_SERVER_ADDR: Ipv4Addr = Ipv4Addr::LOCALHOST;
pub const DEFAULT_SERVER_PORT: u16 = 15440;

/// Server address the client should connect to.
pub fn client_server_addr() -> SocketAddr {
    let addr = parse_addr(std::env::var(SERVER_ADDR_ENV).ok().as_deref());
    let port = parse_port(std::env::var(SERVER_PORT_ENV).ok().as_deref());
    SocketAddr::V4(SocketAddrV4::new(addr, port))
}

/// Port the server should listen on.
pub fn server_port() -> u16 {
    parse_port(std::env::var(SERVER_PORT_ENV).ok().as_deref())
}

fn parse_addr(value: Option<&str>) -> Ipv4Addr {
    match value {
        Some(raw) => match raw.parse() {
            Ok(addr) => {
                tracing::debug!("using {SERVER_ADDR_ENV}={raw}");
                addr
            }
            Err(_) => {
                tracing::warn!(
                    "ignoring unparseable {SERVER_ADDR_ENV}={raw:?}, using {DEFAULT_SERVER_ADDR}"
                );
                DEFAULT_SERVER_ADDR
            }
        },
        None => {
            tracing::debug!("{SERVER_ADDR_ENV} not set, using {DEFAULT_SERVER_ADDR}");
            DEFAULT_SERVER_ADDR
        }
    }
}

fn parse_port(value: Option<&str>) -> u16 {
    match value {
        Some(raw) => match raw.parse() {
            Ok(port) => {
                tracing::debug!("using {SERVER_PORT_ENV}={raw}");
                port
            }
            Err(_) => {
                tracing::warn!(
                    "ignoring unparseable {SERVER_PORT_ENV}={raw:?}, using {DEFAULT_SERVER_PORT}"
                );
                DEFAULT_SERVER_PORT
            }
        },
        None => {
            tracing::debug!("{SERVER_PORT_ENV} not set, using {DEFAULT_SERVER_PORT}");
            DEFAULT_SERVER_PORT
        }
    }
}
