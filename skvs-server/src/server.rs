//! # Worker-Pool Server
//!
//! A fixed set of OS threads races to accept connections from one shared
//! listening socket; the winner serves that connection to completion before
//! going back to accepting.
//!
//! ## Design Principles
//!
//! 1. **Shared Listener**: Every worker owns a clone of the listening socket
//!    registered with its own `mio::Poll`; whichever `accept` succeeds first
//!    owns the connection.
//! 2. **Readiness, Not Sleep**: Would-block conditions park the worker in
//!    `Poll::poll` until the socket (or the shutdown waker) is ready.
//! 3. **Try Before Wait**: Workers attempt the I/O first and wait only after
//!    `WouldBlock`, which keeps edge-triggered readiness from losing wake-ups.
//! 4. **Fail-Open Connections**: Transport errors end only the affected
//!    connection; the worker logs them and returns to accepting.
//!
//! ## Worker States
//!
//! ```text
//! ACCEPTING --accept--> SERVING(conn) --close--> ACCEPTING ... --shutdown--> STOPPED
//! ```

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use skvs_common::BUFFER_SIZE;
use skvs_engine::KVEngine;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::metrics::MetricsSnapshot;
use crate::net::bind_listener;
use crate::protocol::{Frame, LineBuffer, is_disconnect};
use crate::service::Service;
use crate::shutdown::Shutdown;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const CONNECTION: Token = Token(2);

const EVENTS_CAPACITY: usize = 16;

/// Back-off before retrying a failing `accept` (e.g. out of descriptors).
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// A bound, not yet running server.
pub struct Server<E> {
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<Service<E>>,
    workers: usize,
    shutdown: Shutdown,
}

impl<E: KVEngine + 'static> Server<E> {
    /// Wraps a ready listening socket. The socket is switched to
    /// non-blocking mode.
    pub fn new(listener: TcpListener, engine: Arc<E>, workers: usize) -> ServerResult<Self> {
        if workers == 0 {
            return Err(ServerError::InvalidConfig("workers must be at least 1".into()));
        }
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            service: Arc::new(Service::new(engine)),
            workers,
            shutdown: Shutdown::new(),
        })
    }

    /// Validates `config`, binds its address and wraps the listener.
    pub fn bind(config: &ServerConfig, engine: Arc<E>) -> ServerResult<Self> {
        config.validate()?;
        let listener = bind_listener(&config.addr, config.backlog)?;
        Self::new(listener, engine, config.workers)
    }

    /// Get local listening address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the worker threads.
    ///
    /// All pollers are created before the first thread starts, so a setup
    /// failure leaves nothing running.
    pub fn start(self) -> ServerResult<ServerHandle<E>> {
        let mut workers = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            workers.push(Worker::new(
                id,
                &self.listener,
                Arc::clone(&self.service),
                self.shutdown.clone(),
            )?);
        }

        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let name = format!("skvs-worker-{}", worker.id);
            match thread::Builder::new().name(name).spawn(move || worker.run()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.shutdown.trigger();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        info!(addr = %self.local_addr, workers = handles.len(), "server started");

        Ok(ServerHandle {
            local_addr: self.local_addr,
            shutdown: self.shutdown,
            service: self.service,
            handles,
        })
    }
}

/// A running server. Dropping it without [`ServerHandle::join`] leaves the
/// workers running until shutdown is triggered elsewhere.
#[must_use = "the workers keep running until shutdown is triggered and joined"]
pub struct ServerHandle<E> {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    service: Arc<Service<E>>,
    handles: Vec<JoinHandle<()>>,
}

impl<E: KVEngine> ServerHandle<E> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for asynchronous shutdown (e.g. from a signal task).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Requests cooperative shutdown without waiting.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.service.metrics().snapshot()
    }

    /// Waits for every worker to stop and returns the engine.
    ///
    /// Blocks until shutdown has been triggered and each worker has finished
    /// its current request.
    pub fn join(self) -> ServerResult<Arc<E>> {
        let mut panicked = None;
        for (id, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = id, "worker panicked");
                panicked.get_or_insert(id);
            }
        }

        let metrics = self.service.metrics().snapshot();
        info!(%metrics, "server stopped");

        if let Some(id) = panicked {
            return Err(ServerError::WorkerPanicked(id));
        }
        Ok(match Arc::try_unwrap(self.service) {
            Ok(service) => service.into_engine(),
            Err(shared) => Arc::clone(shared.engine()),
        })
    }

    /// Triggers shutdown and joins.
    pub fn stop(self) -> ServerResult<Arc<E>> {
        self.shutdown();
        self.join()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Zero-byte read.
    PeerClosed,
    /// The peer sent a bare line terminator.
    PeerRequested,
    /// Shutdown was requested while serving.
    Shutdown,
}

enum Written {
    Complete,
    Abandoned,
}

struct Worker<E> {
    id: usize,
    poll: Poll,
    events: Events,
    listener: mio::net::TcpListener,
    service: Arc<Service<E>>,
    shutdown: Shutdown,
}

impl<E: KVEngine> Worker<E> {
    fn new(
        id: usize,
        listener: &TcpListener,
        service: Arc<Service<E>>,
        shutdown: Shutdown,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = mio::net::TcpListener::from_std(listener.try_clone()?);
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        shutdown.register(Arc::new(Waker::new(poll.registry(), WAKER)?));

        Ok(Worker {
            id,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            service,
            shutdown,
        })
    }

    fn run(mut self) {
        info!(worker = self.id, "worker ready");
        while !self.shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, peer)) => self.serve(stream, peer),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if let Err(err) = self.wait(None) {
                        error!(worker = self.id, error = %err, "poll failed; worker exiting");
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(worker = self.id, error = %err, "accept failed");
                    if let Err(err) = self.wait(Some(ACCEPT_RETRY)) {
                        error!(worker = self.id, error = %err, "poll failed; worker exiting");
                        break;
                    }
                }
            }
        }
        info!(worker = self.id, "worker stopped");
    }

    fn serve(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        self.service.metrics().record_connection_accepted();
        debug!(worker = self.id, %peer, "connection accepted");

        let registered = self.poll.registry().register(
            &mut stream,
            CONNECTION,
            Interest::READABLE | Interest::WRITABLE,
        );
        match registered.and_then(|()| self.drive(&mut stream)) {
            Ok(reason) => debug!(worker = self.id, %peer, ?reason, "connection closed"),
            Err(err) => warn!(worker = self.id, %peer, error = %err, "connection aborted"),
        }

        let _ = self.poll.registry().deregister(&mut stream);
        self.service.metrics().record_connection_closed();
    }

    /// Reads, answers and writes until the connection ends.
    fn drive(&mut self, stream: &mut TcpStream) -> io::Result<CloseReason> {
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; BUFFER_SIZE];
        let mut out = Vec::with_capacity(BUFFER_SIZE);

        loop {
            if self.shutdown.is_requested() {
                return Ok(CloseReason::Shutdown);
            }

            let n = match stream.read(&mut chunk) {
                Ok(0) => return Ok(CloseReason::PeerClosed),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(None)?;
                    continue;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };

            lines.extend(&chunk[..n]);
            while let Some(frame) = lines.next_frame() {
                if matches!(&frame, Frame::Line(line) if is_disconnect(line)) {
                    return Ok(CloseReason::PeerRequested);
                }

                let response = self.service.serve_frame(&frame);
                out.clear();
                response.encode(&mut out);
                if let Written::Abandoned = self.write_all(stream, &out)? {
                    return Ok(CloseReason::Shutdown);
                }
            }
        }
    }

    /// Writes `buf` in full, waiting for writability on partial writes.
    ///
    /// Gives up only if shutdown is requested while the peer is not draining.
    fn write_all(&mut self, stream: &mut TcpStream, mut buf: &[u8]) -> io::Result<Written> {
        while !buf.is_empty() {
            match stream.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if self.shutdown.is_requested() {
                        return Ok(Written::Abandoned);
                    }
                    self.wait(None)?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Written::Complete)
    }

    /// Parks until any registered source is ready. Events are not inspected:
    /// callers retry their operation and the flag check covers the waker.
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Err(err) if err.kind() != io::ErrorKind::Interrupted => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skvs_engine::{LockOptions, ShardedTable};
    use std::io::{BufRead, BufReader};
    use std::net::TcpStream as StdStream;

    fn start(workers: usize) -> ServerHandle<ShardedTable> {
        let table = ShardedTable::new(16, LockOptions::default()).unwrap();
        let listener = bind_listener("127.0.0.1:0", 16).unwrap();
        Server::new(listener, Arc::new(table), workers)
            .unwrap()
            .start()
            .unwrap()
    }

    fn exchange(stream: &mut StdStream, reader: &mut BufReader<StdStream>, line: &str) -> String {
        stream.write_all(line.as_bytes()).unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        reply.trim_end_matches('\n').to_string()
    }

    #[test]
    fn rejects_zero_workers() {
        let table = ShardedTable::new(1, LockOptions::default()).unwrap();
        let listener = bind_listener("127.0.0.1:0", 1).unwrap();
        assert!(matches!(
            Server::new(listener, Arc::new(table), 0),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn serves_and_stops() {
        let handle = start(2);
        let mut stream = StdStream::connect(handle.local_addr()).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        assert_eq!(exchange(&mut stream, &mut reader, "CREATE k v\n"), "CREATE OK");
        assert_eq!(exchange(&mut stream, &mut reader, "READ k\n"), "v");
        drop(reader);
        drop(stream);

        let engine = handle.stop().unwrap();
        assert_eq!(engine.search("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn stop_returns_while_idle_connection_is_open() {
        let handle = start(1);
        let _idle = StdStream::connect(handle.local_addr()).unwrap();
        // Let the worker pick the connection up and park in a read wait.
        thread::sleep(Duration::from_millis(50));
        handle.stop().unwrap();
    }
}
