use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::StatsdError;

/// Owns the UDP socket used to ship payloads.
///
/// Sends only take the read side of the lock, so several ring consumers can send concurrently. Closing
/// takes the write side and drops the socket, which happens exactly once; anything sent afterwards is
/// discarded.
pub(crate) struct Transport {
    socket: RwLock<Option<UdpSocket>>,
}

impl Transport {
    /// Binds an unconnected UDP socket on an ephemeral port, matching the address family of `target`.
    pub fn bind(target: SocketAddr, write_timeout: Duration) -> io::Result<Self> {
        let socket = match target {
            SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
        };
        socket.set_write_timeout(Some(write_timeout))?;

        Ok(Transport { socket: RwLock::new(Some(socket)) })
    }

    /// Sends `payload` to `addr` as a single datagram.
    pub fn send(&self, payload: &[u8], addr: SocketAddr) -> Result<(), StatsdError> {
        let socket = self.socket.read();
        let Some(socket) = socket.as_ref() else {
            trace!(len = payload.len(), "Transport closed, discarding payload.");
            return Ok(());
        };

        match socket.send_to(payload, addr) {
            Ok(sent) if sent == payload.len() => {
                trace!(%addr, len = sent, "Sent payload.");
                Ok(())
            }
            Ok(sent) => Err(StatsdError::ShortSend { addr, sent, len: payload.len() }),
            Err(source) => Err(StatsdError::Send { addr, len: payload.len(), source }),
        }
    }

    /// Closes the socket.
    ///
    /// Returns `true` if this call closed it, `false` if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.socket.write().take().is_some();
        if closed {
            debug!("Transport socket closed.");
        }
        closed
    }

    /// Returns the local address of the socket, if it is still open.
    #[cfg(test)]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.read().as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr, UdpSocket},
        time::Duration,
    };

    use super::Transport;

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn sends_one_datagram_per_payload() {
        let (server, addr) = receiver();
        let transport = Transport::bind(addr, Duration::from_secs(1)).unwrap();

        transport.send(b"a:1|c\nb:2|c", addr).unwrap();

        let mut buf = [0u8; 1500];
        let len = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"a:1|c\nb:2|c");
    }

    #[test]
    fn close_happens_once() {
        let (_server, addr) = receiver();
        let transport = Transport::bind(addr, Duration::from_secs(1)).unwrap();
        assert!(transport.local_addr().is_some());

        assert!(transport.close());
        assert!(!transport.close());
        assert!(transport.local_addr().is_none());

        // Sending after close is silently discarded.
        transport.send(b"a:1|c", addr).unwrap();
    }
}
