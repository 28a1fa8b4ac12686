//! Canonical peer addresses.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::messages::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A resolved `(ip, port)` pair identifying a node on the overlay.
///
/// Hostnames are resolved once at parse time, so two spellings of the same
/// peer (`localhost:4000` and `127.0.0.1:4000`) compare equal.
pub struct PeerAddress(SocketAddr);

impl PeerAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        PeerAddress(SocketAddr::new(ip, port))
    }

    /// Resolves a `host:port` string, preferring an IPv4 result.
    pub fn resolve(address: &str) -> Result<Self, FormatError> {
        let invalid = || FormatError::InvalidAddress(address.to_string());

        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }

        let candidates: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .collect();

        candidates
            .iter()
            .find(|candidate| candidate.is_ipv4())
            .or_else(|| candidates.first())
            .map(|socket_addr| PeerAddress(*socket_addr))
            .ok_or_else(invalid)
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(socket_addr: SocketAddr) -> Self {
        PeerAddress(socket_addr)
    }
}

impl FromStr for PeerAddress {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeerAddress::resolve(s)
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
