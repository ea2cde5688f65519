//! Bootstraps a replica from a consistent upstream snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::join_all;
use litesync_core::{
    map_postgres_to_lite, map_postgres_to_lite_index, validate_table, BufferLimits, LexiVersion,
    LiteIndexSpec, LiteTableSpec, PublishedSchema, ShardConfig, TypeRegistry,
};
use litesync_replica::Replica;
use tracing::{error, info, warn};

use super::error::{SyncError, SyncResult};
use super::retry::{Remedy, RetryBudget};
use super::table_copy::{copy_table, TableCopyStats};
use crate::connect::{connect_postgres, PgConnection};
use crate::copy_runner::CopyRunner;
use crate::error::PgError;
use crate::pool::{connector, PoolOutcome, TransactionPool};
use crate::published::get_published_schema;
use crate::replication::{
    create_replication_slot, drop_inactive_slots, drop_replication_slot, grant_replication_role,
    parse_lsn, upstream_settings, CreatedSlot, ReplicationSession,
};
use crate::shard::{drop_shard_schema, ensure_shard, register_replica, ShardCheck};
use crate::type_parsers::load_type_registry;

/// Tuning for one sync.
#[derive(Debug, Clone)]
pub struct InitialSyncOptions {
    /// Upper bound on concurrent table copies.
    pub table_copy_workers: usize,
    pub buffer_limits: BufferLimits,
    /// How long to wait for the schema pool to close.
    pub pool_timeout: Duration,
}

impl Default for InitialSyncOptions {
    fn default() -> Self {
        InitialSyncOptions {
            table_copy_workers: 5,
            buffer_limits: BufferLimits::default(),
            pool_timeout: Duration::from_secs(30),
        }
    }
}

/// Totals of a completed sync.
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub slot: String,
    pub version: LexiVersion,
    pub tables: usize,
    pub rows: u64,
    pub indexes: usize,
    pub table_stats: Vec<TableCopyStats>,
    pub copy_elapsed: Duration,
    pub index_elapsed: Duration,
    pub total_elapsed: Duration,
}

/// Copy every published table into an empty replica and register the
/// replica upstream.
///
/// Either the replica ends up populated, indexed and registered, or the
/// local transaction is rolled back and the replication slot created for
/// the attempt is dropped again.
pub async fn initial_sync(
    shard: &ShardConfig,
    replica: &Replica,
    upstream_uri: &str,
    options: &InitialSyncOptions,
) -> SyncResult<SyncStats> {
    shard.validate()?;
    if replica.is_initialized()? {
        let path = replica
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        return Err(SyncError::AlreadyInitialized(path));
    }

    let start = Instant::now();
    let control = connect_postgres(upstream_uri).await?;
    let types = connect_postgres(upstream_uri).await?;
    let mut session: Option<ReplicationSession> = None;
    let mut created_slot: Option<String> = None;

    let result = run_sync(
        shard,
        replica,
        upstream_uri,
        options,
        &control,
        &types,
        &mut session,
        &mut created_slot,
    )
    .await;

    // The exported snapshot lives as long as the session; release it before
    // touching the slot.
    if let Some(session) = session.take() {
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close replication session");
        }
    }

    match result {
        Ok(mut stats) => {
            stats.total_elapsed = start.elapsed();
            info!(
                slot = %stats.slot,
                version = %stats.version,
                tables = stats.tables,
                rows = stats.rows,
                indexes = stats.indexes,
                copy_ms = stats.copy_elapsed.as_millis() as u64,
                index_ms = stats.index_elapsed.as_millis() as u64,
                total_ms = stats.total_elapsed.as_millis() as u64,
                "Initial sync complete"
            );
            Ok(stats)
        }
        Err(e) => {
            error!(error = %e, "Initial sync failed");
            if let Err(rollback) = replica.rollback() {
                error!(error = %rollback, "Failed to roll back replica");
            }
            if let Some(slot) = created_slot {
                if let Err(cleanup) = drop_replication_slot(&control, &slot).await {
                    error!(slot = %slot, error = %cleanup, "Failed to drop replication slot");
                }
            }
            Err(e)
        }
    }
    // `control` and `types` are closed when dropped here.
}

#[allow(clippy::too_many_arguments)]
async fn run_sync(
    shard: &ShardConfig,
    replica: &Replica,
    upstream_uri: &str,
    options: &InitialSyncOptions,
    control: &PgConnection,
    types: &PgConnection,
    session: &mut Option<ReplicationSession>,
    created_slot: &mut Option<String>,
) -> SyncResult<SyncStats> {
    upstream_settings(control)
        .await?
        .check()
        .map_err(SyncError::Config)?;

    setup_shard(control, shard).await?;

    let slot = create_slot(control, shard, upstream_uri, session).await?;
    *created_slot = Some(slot.slot_name.clone());

    let version = LexiVersion::from_lsn(parse_lsn(&slot.consistent_point)?);
    info!(
        slot = %slot.slot_name,
        lsn = %slot.consistent_point,
        version = %version,
        "Created replication slot"
    );

    replica.begin()?;
    replica.initialize_replication(&shard.all_publications(), &version)?;

    let schema = read_schema(shard, upstream_uri, &slot, options.pool_timeout).await?;
    for table in &schema.tables {
        validate_table(table)?;
    }
    let lite_tables: Vec<LiteTableSpec> = schema.tables.iter().map(map_postgres_to_lite).collect();
    let lite_indexes: Vec<LiteIndexSpec> = schema
        .indexes
        .iter()
        .map(map_postgres_to_lite_index)
        .collect();
    replica.create_tables(&lite_tables, &lite_indexes)?;

    let registry = load_type_registry(types).await?;
    let copy_start = Instant::now();
    let table_stats = copy_tables(
        &schema,
        replica,
        upstream_uri,
        &slot.snapshot_name,
        &registry,
        &version,
        options,
    )
    .await?;
    let copy_elapsed = copy_start.elapsed();

    let index_start = Instant::now();
    replica.create_indexes(&lite_indexes)?;
    let index_elapsed = index_start.elapsed();

    register_replica(control, shard, &slot.slot_name, &version, &schema).await?;
    replica.commit()?;

    Ok(SyncStats {
        slot: slot.slot_name,
        version,
        tables: table_stats.len(),
        rows: table_stats.iter().map(|t| t.rows).sum(),
        indexes: lite_indexes.len(),
        table_stats,
        copy_elapsed,
        index_elapsed,
        total_elapsed: Duration::ZERO,
    })
}

/// Set up the shard, recreating it once if its publications disappeared.
async fn setup_shard(control: &PgConnection, shard: &ShardConfig) -> SyncResult<()> {
    let mut budget = RetryBudget::shard_setup();
    loop {
        let err = match ensure_shard(control, shard).await? {
            ShardCheck::Ready => return Ok(()),
            ShardCheck::Mismatch {
                recorded,
                requested,
            } => {
                return Err(SyncError::Config(format!(
                    "requested publications [{}] differ from the shard's publications [{}]",
                    requested.join(", "),
                    recorded.join(", ")
                )))
            }
            ShardCheck::Missing(missing) => SyncError::MissingPublications(missing),
        };
        match budget.claim(&err) {
            Some(Remedy::ResyncShard) => drop_shard_schema(control, shard).await?,
            _ => return Err(err),
        }
    }
}

/// Create the slot on a replication session, applying the slot remedies.
async fn create_slot(
    control: &PgConnection,
    shard: &ShardConfig,
    upstream_uri: &str,
    session: &mut Option<ReplicationSession>,
) -> SyncResult<CreatedSlot> {
    let slot_name = shard.slot_name(unix_millis());
    let mut budget = RetryBudget::slot_creation();
    loop {
        let err = match attempt_slot(upstream_uri, session, &slot_name).await {
            Ok(slot) => return Ok(slot),
            Err(e) => SyncError::from(e),
        };
        match budget.claim(&err) {
            Some(Remedy::GrantReplication) => {
                grant_replication_role(control).await?;
                // The role attribute is checked at connection time.
                if let Some(old) = session.take() {
                    if let Err(e) = old.close().await {
                        warn!(error = %e, "Failed to close replication session");
                    }
                }
            }
            Some(Remedy::DropInactiveSlots) => {
                let dropped = drop_inactive_slots(control, shard).await?;
                if dropped.is_empty() {
                    return Err(err);
                }
                info!(slots = ?dropped, "Dropped inactive replication slots");
            }
            _ => return Err(err),
        }
    }
}

async fn attempt_slot(
    upstream_uri: &str,
    session: &mut Option<ReplicationSession>,
    slot_name: &str,
) -> Result<CreatedSlot, PgError> {
    if session.is_none() {
        *session = Some(ReplicationSession::connect(upstream_uri).await?);
    }
    let session = session
        .as_mut()
        .ok_or_else(|| PgError::Connection("replication session unavailable".to_string()))?;
    create_replication_slot(session, slot_name).await
}

/// Read the published schema in a transaction bound to the slot snapshot.
async fn read_schema(
    shard: &ShardConfig,
    upstream_uri: &str,
    slot: &CreatedSlot,
    timeout: Duration,
) -> SyncResult<PublishedSchema> {
    let pool = TransactionPool::new(
        "schema",
        connector(upstream_uri),
        1,
        Some(slot.snapshot_name.clone()),
    );
    let publications = shard.all_publications();
    let schema = pool
        .process_read_task(move |conn: Arc<PgConnection>| async move {
            get_published_schema(conn.client(), &publications).await
        })
        .await;

    match pool.done(timeout).await {
        Ok(PoolOutcome::Completed) => {}
        Ok(PoolOutcome::TimedOut) => pool.abort(),
        Err(e) => warn!(error = %e, "Schema pool did not close cleanly"),
    }
    Ok(schema?)
}

/// Copy all tables with bounded concurrency, one connection per table.
async fn copy_tables(
    schema: &PublishedSchema,
    replica: &Replica,
    upstream_uri: &str,
    snapshot: &str,
    registry: &TypeRegistry,
    version: &LexiVersion,
    options: &InitialSyncOptions,
) -> SyncResult<Vec<TableCopyStats>> {
    let workers = options
        .table_copy_workers
        .min(schema.tables.len())
        .max(1);
    info!(tables = schema.tables.len(), workers, "Copying tables");

    let runner = CopyRunner::new(connector(upstream_uri), snapshot, workers);
    let limits = options.buffer_limits;
    let copies = schema.tables.iter().map(|table| {
        runner.run(move |conn: Arc<PgConnection>| async move {
            copy_table(conn.client(), table, replica, registry, version, limits).await
        })
    });
    let results = join_all(copies).await;
    runner.close();

    results.into_iter().collect()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
