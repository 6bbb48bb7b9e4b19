//! UDP socket allocation and address discovery.
//!
//! All sockets here are handed out in non-blocking mode so they can be
//! registered with the async runtime; listeners additionally get
//! `SO_REUSEADDR` and `SO_REUSEPORT` so a restarting daemon does not
//! fight its predecessor's TIME_WAIT state for the signalling port.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

/// Draw a random port from the unprivileged range.
pub fn random_unprivileged_port() -> u16 {
    rand::thread_rng().gen_range(1025..=65535)
}

fn new_udp_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Allocate the daemon's listening socket with reuse flags set.
pub fn bind_listen_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.bind(&addr.into())?;
    debug!("bound listening udp socket on {}", addr);
    Ok(socket.into())
}

/// Allocate an ephemeral socket for outbound replies and control
/// requests. The kernel picks the port.
pub fn allocate_ephemeral_socket() -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
    Ok(socket.into())
}

/// Discover the address this host is reachable under.
///
/// Connects a throwaway UDP socket towards a public resolver and reads
/// the local half of the pairing; no packet is actually sent. Falls back
/// to loopback when the host has no route.
pub fn discover_server_address() -> IpAddr {
    match probe_external_address() {
        Ok(address) => address,
        Err(err) => {
            warn!("failed to discover server address ({}), using 127.0.0.1", err);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn probe_external_address() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(("8.8.8.8", 53))?;
    Ok(socket.local_addr()?.ip())
}
