//! Listening socket setup.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};

/// Resolves `addr` and binds a non-blocking, address-reusing listener to the
/// first candidate that accepts it.
pub fn bind_listener(addr: &str, backlog: u32) -> ServerResult<TcpListener> {
    let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
    for candidate in addr.to_socket_addrs()? {
        match bind_one(candidate, backlog) {
            Ok(listener) => return Ok(listener),
            Err(err) => warn!(%candidate, error = %err, "bind attempt failed"),
        }
    }
    Err(ServerError::NoBindableAddress {
        addr: addr.to_string(),
    })
}

fn bind_one(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    debug!(%addr, backlog, "listener bound");
    Ok(socket.into())
}
