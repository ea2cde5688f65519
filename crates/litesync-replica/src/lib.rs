mod ddl;
mod error;
mod inserter;
mod sqlite;

use litesync_core::LexiVersion;
use serde::{Deserialize, Serialize};

pub use ddl::{create_fulltext_statements, create_index_statement, create_table_statement};
pub use error::{ReplicaError, ReplicaResult};
pub use inserter::BatchInserter;
pub use sqlite::{remove_replica_files, Replica};

/// What the replica was initialized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfig {
    /// Watermark of the initial sync.
    pub replica_version: LexiVersion,
    pub publications: Vec<String>,
}
