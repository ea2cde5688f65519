//! Bounded runner giving every copy task its own connection.
//!
//! Reusing one connection for a long sequence of `COPY ... TO STDOUT`
//! commands inside a snapshot transaction can stall the server once there
//! are more tables than workers. Each task here gets a fresh connection
//! that imports the shared snapshot, runs exactly one task and is discarded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::PgError;
use crate::pool::{lock, ConnectFn, PoolConnection};

pub struct CopyRunner<C: PoolConnection> {
    connect: ConnectFn<C>,
    snapshot: String,
    permits: Semaphore,
    outstanding: Mutex<HashMap<u64, Arc<C>>>,
    next_id: AtomicU64,
}

impl<C: PoolConnection> CopyRunner<C> {
    /// Allow at most `concurrency` connections open at once, all bound to
    /// `snapshot`.
    pub fn new(connect: ConnectFn<C>, snapshot: impl Into<String>, concurrency: usize) -> Self {
        CopyRunner {
            connect,
            snapshot: snapshot.into(),
            permits: Semaphore::new(concurrency.max(1)),
            outstanding: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `task` on a new snapshot-bound connection and commit afterwards.
    /// The connection is terminated if the task fails.
    pub async fn run<T, E, F, Fut>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PgError>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PgError::PoolClosed)?;

        let conn = Arc::new((self.connect)().await?);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.outstanding).insert(id, conn.clone());

        let result: Result<T, E> = async {
            conn.begin_snapshot(Some(&self.snapshot)).await?;
            let value = task(conn.clone()).await?;
            conn.batch_execute("COMMIT").await?;
            Ok(value)
        }
        .await;

        lock(&self.outstanding).remove(&id);
        if result.is_err() {
            debug!(connection = id, "Terminating connection of failed copy task");
            conn.terminate();
        }
        result
    }

    /// Refuse new tasks and terminate connections still in use.
    pub fn close(&self) {
        self.permits.close();
        let outstanding: Vec<Arc<C>> = lock(&self.outstanding).drain().map(|(_, c)| c).collect();
        if !outstanding.is_empty() {
            warn!(
                connections = outstanding.len(),
                "Terminating outstanding copy connections"
            );
        }
        for conn in outstanding {
            conn.terminate();
        }
    }
}
