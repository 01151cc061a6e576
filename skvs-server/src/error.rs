//! Errors raised while setting up or running the server.
//!
//! Per-request failures never reach this type: they are answered on the wire
//! (`INVALID CMD`, `INTERNAL ERR`) or end a single connection.

use std::io;

use skvs_common::SkvsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket, poller or thread setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Table or lock construction failed.
    #[error("engine error: {0}")]
    Engine(#[from] SkvsError),

    /// The configured address did not resolve to anything bindable.
    #[error("could not bind to any address for '{addr}'")]
    NoBindableAddress { addr: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_engine_errors() {
        let err = ServerError::from(SkvsError::OutOfMemory);
        assert_eq!(err.to_string(), "engine error: out of memory");
    }

    #[test]
    fn names_unbindable_address() {
        let err = ServerError::NoBindableAddress {
            addr: "nowhere:1".to_string(),
        };
        assert!(err.to_string().contains("nowhere:1"));
    }
}
