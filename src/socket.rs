//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that moves raw
//! datagrams.  Encoding, fault injection, and all protocol logic live
//! elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Receive buffer size (theoretical UDP limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks; the
/// sender's transfer loop and ack listener both hold an `Arc<Socket>`.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `bytes` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next datagram.
    ///
    /// Returns `(bytes, sender_address)`.
    pub async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

/// Returns true if the error is likely transient (the next receive may succeed).
///
/// ICMP "port unreachable" surfaces as a reset/refused error on some
/// platforms after sending to a peer that has gone away.
pub fn is_transient(e: &io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}
