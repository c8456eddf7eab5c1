//! Universe to multicast group mapping and socket setup.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{ReceiverError, Result};

/// UDP port used by sACN
pub const SACN_PORT: u16 = 5568;

/// Multicast group carrying `universe`: `239.255.<high byte>.<low byte>`
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// Create a non-blocking UDP socket bound to `0.0.0.0:port`.
///
/// SO_REUSEADDR is set so other sACN listeners on the same host (visualisers,
/// a second bridge) can share the port.
pub(crate) fn bind_socket(port: u16) -> Result<UdpSocket> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    let bind_error = |source| ReceiverError::Bind { addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    socket.set_nonblocking(true).map_err(bind_error)?;
    socket.bind(&SocketAddr::V4(addr).into()).map_err(bind_error)?;

    tracing::debug!("sACN socket bound to {}", addr);
    Ok(socket.into())
}

/// Join the group of every universe on `interface`.
pub(crate) fn join_groups(
    socket: &UdpSocket,
    universes: &[u16],
    interface: Ipv4Addr,
) -> Result<Vec<(u16, Ipv4Addr)>> {
    let mut joined = Vec::with_capacity(universes.len());
    for &universe in universes {
        let group = multicast_group(universe);
        socket
            .join_multicast_v4(&group, &interface)
            .map_err(|source| ReceiverError::JoinGroup {
                universe,
                group,
                source,
            })?;
        tracing::info!("Joined multicast group {} for universe {}", group, universe);
        joined.push((universe, group));
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_group_mapping() {
        assert_eq!(multicast_group(1), Ipv4Addr::new(239, 255, 0, 1));
        assert_eq!(multicast_group(300), Ipv4Addr::new(239, 255, 1, 44));
        assert_eq!(multicast_group(63999), Ipv4Addr::new(239, 255, 249, 255));
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let socket = bind_socket(0).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }
}
