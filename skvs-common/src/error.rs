//! # SKVS Error Types
//!
//! ## Design Principles
//!
//! 1. **Stable Codes**: Each variant has a fixed numeric code so logs and
//!    tests can refer to failures without string matching.
//! 2. **Categorized Ranges**: Codes are grouped by intent (client, server, protocol).
//! 3. **Low Overhead**: Enums are `Copy` and `repr(u16)` so results stay register-sized.
//!
//! Misses (`COLLISION`, `NOT FOUND`) are *not* errors: engines report them as
//! ordinary outcomes. Only conditions that cannot be answered normally end up
//! here.

use core::fmt;

/// Result type used across SKVS components.
pub type SkvsResult<T> = core::result::Result<T, SkvsError>;

/// High-level category for grouping error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SkvsErrorCategory {
    /// Invalid input or user request issues.
    Client,
    /// Server-side resource failures.
    Server,
    /// Malformed traffic on the wire.
    Protocol,
}

/// Error codes shared by the engine, server and client.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SkvsError {
    /// Client error: a size or count failed validation (code 1).
    InvalidInput = 1,
    /// Client error: key length exceeds MAX_KEY_LEN (code 2).
    KeyTooLong = 2,

    /// Server error: storage for a key, value or lock could not be allocated (code 10).
    OutOfMemory = 10,

    /// Protocol error: request shape does not match its command (code 30).
    MalformedRequest = 30,
    /// Protocol error: response line could not be understood (code 32).
    UnexpectedResponse = 32,
}

impl SkvsError {
    /// Returns the stable numeric code for the error.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns the coarse category of the error.
    pub const fn category(self) -> SkvsErrorCategory {
        match self {
            Self::InvalidInput | Self::KeyTooLong => SkvsErrorCategory::Client,
            Self::OutOfMemory => SkvsErrorCategory::Server,
            Self::MalformedRequest | Self::UnexpectedResponse => SkvsErrorCategory::Protocol,
        }
    }
}

impl fmt::Display for SkvsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidInput => "invalid input",
            Self::KeyTooLong => "key too long",
            Self::OutOfMemory => "out of memory",
            Self::MalformedRequest => "malformed request",
            Self::UnexpectedResponse => "unexpected response",
        };
        write!(f, "{}", label)
    }
}

impl std::error::Error for SkvsError {}

impl From<std::collections::TryReserveError> for SkvsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        SkvsError::OutOfMemory
    }
}
