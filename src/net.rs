//! Listener construction helpers

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener};

/// Bind a TCP listener with SO_REUSEADDR set
///
/// Reuse-addr matters for the harness: test runs bind, tear down and
/// rebind the same port in quick succession.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_listener(addr).unwrap();
        let bound = listener.local_addr().unwrap();
        assert_ne!(bound.port(), 0);
    }

    #[test]
    fn test_rebind_same_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_listener(addr).unwrap();
        let bound = listener.local_addr().unwrap();
        drop(listener);

        // Immediate rebind of the same port must succeed.
        let listener = bind_listener(bound).unwrap();
        assert_eq!(listener.local_addr().unwrap(), bound);
    }
}
