//! Initial sync of a replica from upstream.

mod error;
mod initial_sync;
mod retry;
mod table_copy;

pub use error::{SyncError, SyncResult};
pub use initial_sync::{initial_sync, InitialSyncOptions, SyncStats};
pub use retry::{Remedy, RetryBudget, RetryPolicy};
pub use table_copy::{
    copy_statement, copy_table, load_copy_stream, select_statement, TableCopyStats,
};
