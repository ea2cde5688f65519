//! In-memory connection used by the pool and runner tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{PgError, PgResult};
use crate::pool::{lock, ConnectFn, PoolConnection};

#[derive(Default)]
struct Backend {
    fail_connect: bool,
    open: AtomicUsize,
    max_open: AtomicUsize,
    statements: Mutex<Vec<Vec<String>>>,
    terminated: Mutex<Vec<bool>>,
}

/// Records every statement per connection, in connection order.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Backend>,
}

pub struct FakeConnection {
    id: usize,
    backend: Arc<Backend>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses every connection.
    pub fn failing() -> Self {
        FakeBackend {
            inner: Arc::new(Backend {
                fail_connect: true,
                ..Backend::default()
            }),
        }
    }

    pub fn connector(&self) -> ConnectFn<FakeConnection> {
        let backend = self.inner.clone();
        Arc::new(move || {
            let backend = backend.clone();
            Box::pin(async move {
                if backend.fail_connect {
                    return Err(PgError::Connection("connection refused".to_string()));
                }
                let id = {
                    let mut statements = lock(&backend.statements);
                    statements.push(Vec::new());
                    lock(&backend.terminated).push(false);
                    statements.len() - 1
                };
                let open = backend.open.fetch_add(1, Ordering::SeqCst) + 1;
                backend.max_open.fetch_max(open, Ordering::SeqCst);
                Ok(FakeConnection { id, backend })
            })
        })
    }

    /// Connections opened so far.
    pub fn connections(&self) -> usize {
        lock(&self.inner.statements).len()
    }

    pub fn statements(&self, conn: usize) -> Vec<String> {
        lock(&self.inner.statements)
            .get(conn)
            .cloned()
            .unwrap_or_default()
    }

    pub fn terminated(&self, conn: usize) -> bool {
        lock(&self.inner.terminated)
            .get(conn)
            .copied()
            .unwrap_or(false)
    }

    pub fn open(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.inner.max_open.load(Ordering::SeqCst)
    }
}

impl FakeConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl PoolConnection for FakeConnection {
    async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        if let Some(log) = lock(&self.backend.statements).get_mut(self.id) {
            log.push(sql.to_string());
        }
        Ok(())
    }

    fn terminate(&self) {
        if let Some(flag) = lock(&self.backend.terminated).get_mut(self.id) {
            *flag = true;
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.backend.open.fetch_sub(1, Ordering::SeqCst);
    }
}
