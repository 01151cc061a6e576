//! # Command Dispatch
//!
//! Turn one request line into one response by running the parsed command
//! against the engine.
//!
//! ## Design Principles
//!
//! 1. **Single Responsibility**: Parsing lives in `protocol`, storage in the
//!    engine; this module only maps outcomes to response lines.
//! 2. **Fail-Open Defaults**: Malformed input and engine failures become
//!    `INVALID CMD` / `INTERNAL ERR`; the connection keeps going.
//! 3. **Generic Engine**: `Service<E>` is generic over [`KVEngine`] so tests
//!    can plug in a failing engine.

use std::sync::Arc;
use std::time::Instant;

use skvs_common::{Command, Response, SkvsError, SkvsResult};
use skvs_engine::{InsertStatus, KVEngine};
use tracing::{trace, warn};

use crate::metrics::Metrics;
use crate::protocol::{Frame, Parsed, Request, parse_request};

/// Shared server context: the engine plus request metrics.
///
/// Read-only after construction; workers share it through an `Arc`.
pub struct Service<E> {
    engine: Arc<E>,
    metrics: Metrics,
}

impl<E: KVEngine> Service<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Service {
            engine,
            metrics: Metrics::new(),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Parses `buf` and executes the request it holds.
    ///
    /// Returns `None` while the request is still incomplete.
    pub fn serve(&self, buf: &[u8]) -> Option<Response> {
        self.answer(parse_request(buf))
    }

    /// Answers one frame cut by the connection's line buffer.
    pub fn serve_frame(&self, frame: &Frame) -> Response {
        let parsed = match frame {
            Frame::Line(line) => parse_request(line),
            Frame::Overflow => Parsed::Invalid,
        };
        // A framed line always holds its terminator, so it is never incomplete.
        self.answer(parsed).unwrap_or(Response::InvalidCmd)
    }

    /// Runs a parsed request against the engine.
    pub fn execute(&self, request: Request<'_>) -> Response {
        self.dispatch(request).unwrap_or_else(|err| {
            warn!(
                command = %request.command,
                key = request.key,
                code = err.code(),
                error = %err,
                "engine failure"
            );
            Response::InternalErr
        })
    }

    /// Releases the context, returning the engine.
    pub fn into_engine(self) -> Arc<E> {
        self.engine
    }

    fn dispatch(&self, request: Request<'_>) -> SkvsResult<Response> {
        trace!(command = %request.command, key = request.key, "dispatch");
        let key = request.key;
        let response = match (request.command, request.value) {
            (Command::Create, Some(value)) => match self.engine.insert(key, value)? {
                InsertStatus::Created => Response::CreateOk,
                InsertStatus::Collision => Response::Collision,
            },
            (Command::Read, None) => match self.engine.search(key)? {
                Some(value) => Response::Value(value),
                None => Response::NotFound,
            },
            (Command::Update, Some(value)) => match self.engine.update(key, value)? {
                true => Response::UpdateOk,
                false => Response::NotFound,
            },
            (Command::Delete, None) => match self.engine.delete(key)? {
                true => Response::DeleteOk,
                false => Response::NotFound,
            },
            // The parser never produces these shapes.
            _ => return Err(SkvsError::MalformedRequest),
        };
        Ok(response)
    }

    fn answer(&self, parsed: Parsed<'_>) -> Option<Response> {
        let request = match parsed {
            Parsed::Incomplete => return None,
            Parsed::Invalid => None,
            Parsed::Request(request) => Some(request),
        };

        self.metrics.record_request_start();
        let started = Instant::now();
        let response = match request {
            Some(request) => self.execute(request),
            None => Response::InvalidCmd,
        };
        self.metrics.record_request_end(started.elapsed());

        if response.is_error() {
            self.metrics.record_error();
        }
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skvs_engine::{LockOptions, ShardedTable};

    fn service() -> Service<ShardedTable> {
        let table = ShardedTable::new(16, LockOptions::default()).unwrap();
        Service::new(Arc::new(table))
    }

    fn reply(service: &Service<ShardedTable>, line: &str) -> String {
        service.serve(line.as_bytes()).unwrap().to_string()
    }

    #[test]
    fn crud_round() {
        let svc = service();
        assert_eq!(reply(&svc, "CREATE k v1\n"), "CREATE OK");
        assert_eq!(reply(&svc, "READ k\n"), "v1");
        assert_eq!(reply(&svc, "CREATE k v2\n"), "COLLISION");
        assert_eq!(reply(&svc, "READ k\n"), "v1");
        assert_eq!(reply(&svc, "UPDATE k v3\n"), "UPDATE OK");
        assert_eq!(reply(&svc, "read K\n"), "NOT FOUND");
        assert_eq!(reply(&svc, "read k\n"), "v3");
        assert_eq!(reply(&svc, "DELETE k\n"), "DELETE OK");
        assert_eq!(reply(&svc, "READ k\n"), "NOT FOUND");
        assert_eq!(reply(&svc, "DELETE k\n"), "NOT FOUND");
    }

    #[test]
    fn update_missing_is_not_found() {
        let svc = service();
        assert_eq!(reply(&svc, "UPDATE ghost v\n"), "NOT FOUND");
        assert_eq!(reply(&svc, "READ ghost\n"), "NOT FOUND");
    }

    #[test]
    fn malformed_lines_are_invalid_and_counted() {
        let svc = service();
        assert_eq!(reply(&svc, "FETCH k\n"), "INVALID CMD");
        assert_eq!(reply(&svc, "READ k extra\n"), "INVALID CMD");
        assert_eq!(svc.serve_frame(&Frame::Overflow), Response::InvalidCmd);

        let snap = svc.metrics().snapshot();
        assert_eq!(snap.requests_total, 3);
        assert_eq!(snap.errors_total, 3);
    }

    #[test]
    fn incomplete_produces_no_response() {
        let svc = service();
        assert_eq!(svc.serve(b"CRE"), None);
        assert_eq!(svc.metrics().snapshot().requests_total, 0);
    }

    struct ExhaustedEngine;

    impl KVEngine for ExhaustedEngine {
        fn insert(&self, _: &str, _: &str) -> SkvsResult<InsertStatus> {
            Err(SkvsError::OutOfMemory)
        }

        fn search(&self, _: &str) -> SkvsResult<Option<String>> {
            Err(SkvsError::OutOfMemory)
        }

        fn update(&self, _: &str, _: &str) -> SkvsResult<bool> {
            Err(SkvsError::OutOfMemory)
        }

        fn delete(&self, _: &str) -> SkvsResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn engine_failures_become_internal_err() {
        let svc = Service::new(Arc::new(ExhaustedEngine));
        assert_eq!(svc.serve(b"CREATE k v\n"), Some(Response::InternalErr));
        assert_eq!(svc.serve(b"READ k\n"), Some(Response::InternalErr));
        assert_eq!(svc.serve(b"UPDATE k v\n"), Some(Response::InternalErr));
        assert_eq!(svc.serve(b"DELETE k\n"), Some(Response::NotFound));
        assert_eq!(svc.metrics().snapshot().errors_total, 3);
    }
}
