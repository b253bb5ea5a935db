//! Local address detection for the rsync hint.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::{debug, warn};

/// Public address used only to pick the outbound interface. Connecting a UDP
/// socket sends nothing on the wire.
const PROBE_ADDR: &str = "192.0.2.1:9";

/// Address of the interface that would carry outbound traffic.
///
/// Falls back to `127.0.0.1` when the host has no route (offline build
/// machines, network namespaces without interfaces).
pub fn get_local_ip() -> IpAddr {
    match probe_local_ip() {
        Ok(ip) => {
            debug!("Local address detected: {}", ip);
            ip
        }
        Err(e) => {
            warn!("Could not determine local address, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn probe_local_ip() -> std::io::Result<IpAddr> {
    let probe: SocketAddr = PROBE_ADDR
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(probe)?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "socket bound to unspecified address",
        ));
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_address_parses() {
        assert!(PROBE_ADDR.parse::<SocketAddr>().is_ok());
    }

    #[test]
    fn test_local_ip_is_never_unspecified() {
        // Either a routable interface address or the loopback fallback
        let ip = get_local_ip();
        assert!(!ip.is_unspecified());
    }
}
