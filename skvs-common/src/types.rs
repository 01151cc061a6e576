//! Wire limits and deployment defaults shared by the server and the client.

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 32;

/// Capacity of one request or response line, terminator included.
pub const BUFFER_SIZE: usize = 4096;

/// Line terminator for requests and responses.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Address the server binds to unless configured otherwise.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Host the client dials unless configured otherwise.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default number of worker threads. Also sizes each lock's writer ring.
pub const DEFAULT_WORKERS: usize = 10;

/// Default number of hash table buckets.
pub const DEFAULT_BUCKETS: usize = 1024;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 20;

/// Returns true if `key` fits the wire limit.
pub const fn key_fits(key: &str) -> bool {
    key.len() <= MAX_KEY_LEN
}
