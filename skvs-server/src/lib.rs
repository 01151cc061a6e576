//! # SKVS Server
//!
//! Serves the newline-delimited CRUD protocol from a fixed pool of worker
//! threads over one shared [`skvs_engine::ShardedTable`].

pub mod config;
pub mod error;
pub mod metrics;
pub mod net;
pub mod protocol;
pub mod server;
pub mod service;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use metrics::{Metrics, MetricsSnapshot};
pub use server::{Server, ServerHandle};
pub use service::Service;
pub use shutdown::Shutdown;
