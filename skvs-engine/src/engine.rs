//! # Storage Engine Interface
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Abstract the engine behind a trait so the server
//!    can be driven by any table implementation.
//! 2. **Misses Are Outcomes**: Collisions and missing keys are reported in the
//!    `Ok` value; `Err` is reserved for conditions like allocation failure.
//! 3. **Zero-Cost Dispatch**: When used with generics, calls monomorphize to
//!    avoid dynamic dispatch overhead.
//! 4. **Copy-Out Reads**: `search` hands back an owned value so no reference
//!    into the engine outlives its lock.

use skvs_common::SkvsResult;

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStatus {
    /// The key was new and the entry was created.
    Created,
    /// The key already existed; nothing was changed.
    Collision,
}

/// Strategy pattern: defines the engine behavior surface for the server.
pub trait KVEngine: Send + Sync {
    /// Creates `key` with `value` unless the key already exists.
    fn insert(&self, key: &str, value: &str) -> SkvsResult<InsertStatus>;

    /// Returns a copy of the value for `key`, or `None` if missing.
    fn search(&self, key: &str) -> SkvsResult<Option<String>>;

    /// Replaces the value of an existing key. Returns true if the key existed.
    fn update(&self, key: &str, value: &str) -> SkvsResult<bool>;

    /// Removes a key. Returns true if the key existed and was removed.
    fn delete(&self, key: &str) -> SkvsResult<bool>;
}
