// skvs-common - Shared types and protocol vocabulary for SKVS
//
// This crate defines the error codes, wire limits and command/response
// names used by the engine, the server and the client.

pub mod error;
pub mod protocol;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
pub use types::*;
