//! Snapshot-pinned pool of read-only transactions.
//!
//! Each worker opens one connection, begins a `REPEATABLE READ` transaction
//! (optionally importing an exported snapshot) and then runs queued tasks on
//! it until the pool is marked done.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use postgres_protocol::escape::escape_literal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connect::{connect_postgres, PgConnection};
use crate::error::{PgError, PgResult};

/// A connection the pool and the copy runner can drive.
#[async_trait]
pub trait PoolConnection: Send + Sync + 'static {
    async fn batch_execute(&self, sql: &str) -> PgResult<()>;

    /// Drop the connection without waiting for in-flight statements.
    fn terminate(&self);

    /// Begin a read-only transaction, bound to `snapshot` when given.
    async fn begin_snapshot(&self, snapshot: Option<&str>) -> PgResult<()> {
        self.batch_execute(&begin_statement(snapshot)).await
    }
}

#[async_trait]
impl PoolConnection for PgConnection {
    async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        self.client().batch_execute(sql).await?;
        Ok(())
    }

    fn terminate(&self) {
        PgConnection::terminate(self)
    }
}

/// Statements opening a snapshot-bound read-only transaction.
pub fn begin_statement(snapshot: Option<&str>) -> String {
    let mut sql = String::from("BEGIN READ ONLY ISOLATION LEVEL REPEATABLE READ;");
    if let Some(snapshot) = snapshot {
        sql.push_str("\nSET TRANSACTION SNAPSHOT ");
        sql.push_str(&escape_literal(snapshot));
        sql.push(';');
    }
    sql
}

/// Opens a new connection.
pub type ConnectFn<C> = Arc<dyn Fn() -> BoxFuture<'static, PgResult<C>> + Send + Sync>;

/// Connect function for a Postgres URI.
pub fn connector(connection_string: &str) -> ConnectFn<PgConnection> {
    let connection_string = connection_string.to_string();
    Arc::new(move || {
        let connection_string = connection_string.clone();
        Box::pin(async move { connect_postgres(&connection_string).await })
    })
}

/// How a pool drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    Completed,
    TimedOut,
}

/// A queued task. Receives the worker's connection, or the reason the
/// worker has none, and reports whether it succeeded.
type Job<C> = Box<dyn FnOnce(Result<Arc<C>, String>) -> BoxFuture<'static, bool> + Send>;

const TASK_SAVEPOINT: &str = "litesync_task";

/// A fixed set of workers, each holding one open transaction for the
/// lifetime of the pool.
pub struct TransactionPool<C: PoolConnection> {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job<C>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    connections: Arc<Mutex<Vec<Arc<C>>>>,
}

impl<C: PoolConnection> TransactionPool<C> {
    /// Start `workers` workers. Every worker imports `snapshot` before it
    /// runs any task.
    pub fn new(
        name: impl Into<String>,
        connect: ConnectFn<C>,
        workers: usize,
        snapshot: Option<String>,
    ) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Job<C>>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let handles = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    format!("{}-{}", name, id),
                    connect.clone(),
                    snapshot.clone(),
                    receiver.clone(),
                    connections.clone(),
                ))
            })
            .collect();

        debug!(pool = %name, workers = workers.max(1), "Started transaction pool");
        TransactionPool {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            connections,
        }
    }

    /// Queue `task` and wait for its result. A failing task does not affect
    /// other tasks on the same worker.
    pub async fn process_read_task<T, E, F, Fut>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<PgError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job<C> = Box::new(move |conn| {
            Box::pin(async move {
                let result = match conn {
                    Ok(conn) => task(conn).await,
                    Err(reason) => Err(PgError::Pool(reason).into()),
                };
                let ok = result.is_ok();
                // The submitter may have stopped waiting.
                let _ = tx.send(result);
                ok
            })
        });

        {
            let sender = lock(&self.sender);
            let sender = sender.as_ref().ok_or(PgError::PoolClosed)?;
            sender.send(job).map_err(|_| PgError::PoolClosed)?;
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                Err(PgError::Pool("worker exited before finishing the task".to_string()).into())
            }
        }
    }

    /// No more tasks will be submitted. Workers finish the queue, commit and
    /// close.
    pub fn set_done(&self) {
        lock(&self.sender).take();
    }

    /// Wait for every worker to close, giving up after `timeout`.
    pub async fn done(&self, timeout: Duration) -> PgResult<PoolOutcome> {
        self.set_done();
        let mut handles = std::mem::take(&mut *lock(&self.workers));
        let joined = tokio::time::timeout(timeout, join_all(handles.iter_mut())).await;
        match joined {
            Ok(results) => {
                for result in results {
                    result.map_err(|e| PgError::Pool(e.to_string()))?;
                }
                debug!(pool = %self.name, "Transaction pool closed");
                Ok(PoolOutcome::Completed)
            }
            Err(_) => {
                // Still running; `abort` must be able to reach them.
                lock(&self.workers).extend(handles);
                warn!(pool = %self.name, ?timeout, "Timed out waiting for transaction pool");
                Ok(PoolOutcome::TimedOut)
            }
        }
    }

    /// Stop all workers and drop their connections.
    pub fn abort(&self) {
        self.set_done();
        for handle in lock(&self.workers).drain(..) {
            handle.abort();
        }
        for conn in lock(&self.connections).drain(..) {
            conn.terminate();
        }
    }
}

async fn run_worker<C: PoolConnection>(
    id: String,
    connect: ConnectFn<C>,
    snapshot: Option<String>,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job<C>>>>,
    connections: Arc<Mutex<Vec<Arc<C>>>>,
) {
    let conn = match open_transaction(&connect, snapshot.as_deref()).await {
        Ok(conn) => {
            let conn = Arc::new(conn);
            lock(&connections).push(conn.clone());
            Ok(conn)
        }
        Err(e) => {
            warn!(worker = %id, error = %e, "Worker failed to start its transaction");
            Err(e.to_string())
        }
    };

    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        match &conn {
            Ok(conn) => {
                if let Err(e) = conn
                    .batch_execute(&format!("SAVEPOINT {}", TASK_SAVEPOINT))
                    .await
                {
                    job(Err(e.to_string())).await;
                    continue;
                }
                let release = if job(Ok(conn.clone())).await {
                    format!("RELEASE SAVEPOINT {}", TASK_SAVEPOINT)
                } else {
                    format!("ROLLBACK TO SAVEPOINT {}", TASK_SAVEPOINT)
                };
                if let Err(e) = conn.batch_execute(&release).await {
                    warn!(worker = %id, error = %e, "Failed to reset task savepoint");
                }
            }
            Err(reason) => {
                job(Err(reason.clone())).await;
            }
        }
    }

    if let Ok(conn) = conn {
        if let Err(e) = conn.batch_execute("COMMIT").await {
            warn!(worker = %id, error = %e, "Failed to close worker transaction");
        }
        debug!(worker = %id, "Worker closed");
    }
}

async fn open_transaction<C: PoolConnection>(
    connect: &ConnectFn<C>,
    snapshot: Option<&str>,
) -> PgResult<C> {
    let conn = connect().await?;
    if let Err(e) = conn.begin_snapshot(snapshot).await {
        conn.terminate();
        return Err(e);
    }
    Ok(conn)
}

/// Lock a std mutex, ignoring poisoning; the guarded data stays consistent
/// because no critical section here can panic midway.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
