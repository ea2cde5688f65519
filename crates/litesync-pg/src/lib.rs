mod connect;
pub mod copy_runner;
mod error;
pub mod pool;
pub mod published;
pub mod replication;
pub mod shard;
pub mod sync;
pub mod type_parsers;

#[cfg(test)]
mod testing;

pub use connect::{connect_postgres, PgConnection};
pub use copy_runner::CopyRunner;
pub use error::{PgError, PgResult};
pub use pool::{connector, ConnectFn, PoolConnection, PoolOutcome, TransactionPool};
pub use published::get_published_schema;
pub use replication::{parse_lsn, ReplicationSession};
pub use shard::{drop_shard, ensure_shard, registered_replicas, ReplicaRecord, ShardCheck};
pub use sync::{initial_sync, InitialSyncOptions, SyncError, SyncResult, SyncStats, TableCopyStats};
pub use type_parsers::load_type_registry;
