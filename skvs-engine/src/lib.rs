
pub mod engine;
pub mod rwlock;
pub mod table;

pub use engine::InsertStatus;
pub use engine::KVEngine;
pub use rwlock::{FairRwLock, LockOptions, LockStats, RawFairLock};
pub use table::{BucketDump, ShardedTable, TableDump};
