use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use litesync_core::{IndexKind, LexiVersion, LiteIndexSpec, LiteTableSpec, RowBuffer};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::ddl::{create_fulltext_statements, create_index_statement, create_table_statement};
use crate::error::{ReplicaError, ReplicaResult};
use crate::inserter::BatchInserter;
use crate::ReplicationConfig;

const REPLICATION_CONFIG_TABLE: &str = "_litesync.replicationConfig";
const REPLICATION_STATE_TABLE: &str = "_litesync.replicationState";

const CREATE_REPLICATION_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS "_litesync.replicationConfig" (
    "replicaVersion" TEXT NOT NULL,
    "publications" TEXT NOT NULL,
    "lock" INTEGER PRIMARY KEY DEFAULT 1 CHECK ("lock" = 1)
);
CREATE TABLE IF NOT EXISTS "_litesync.replicationState" (
    "stateVersion" TEXT NOT NULL,
    "lock" INTEGER PRIMARY KEY DEFAULT 1 CHECK ("lock" = 1)
);
"#;

/// The SQLite replica.
pub struct Replica {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Replica {
    /// Open or create a replica at the given path.
    pub fn open(path: impl AsRef<Path>) -> ReplicaResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening replica");

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Configured replica journal");
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory replica (for testing).
    pub fn in_memory() -> ReplicaResult<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> ReplicaResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ReplicaError::Poisoned)
    }

    pub fn begin(&self) -> ReplicaResult<()> {
        self.conn()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit(&self) -> ReplicaResult<()> {
        self.conn()?.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Roll back the open transaction, if any.
    pub fn rollback(&self) -> ReplicaResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Create tables, and the full-text tables that must exist before rows
    /// are inserted so their triggers see every row.
    pub fn create_tables(
        &self,
        tables: &[LiteTableSpec],
        indexes: &[LiteIndexSpec],
    ) -> ReplicaResult<()> {
        let conn = self.conn()?;
        for table in tables {
            debug!(table = %table.name, "Creating replica table");
            conn.execute_batch(&create_table_statement(table))?;
        }
        for index in indexes.iter().filter(|i| i.kind == IndexKind::Fulltext) {
            debug!(index = %index.name, table = %index.table_name, "Creating full-text index");
            for stmt in create_fulltext_statements(index) {
                conn.execute_batch(&stmt)?;
            }
        }
        Ok(())
    }

    /// Create the plain indexes, after data has been copied.
    pub fn create_indexes(&self, indexes: &[LiteIndexSpec]) -> ReplicaResult<usize> {
        let conn = self.conn()?;
        let mut created = 0;
        for index in indexes.iter().filter(|i| i.kind == IndexKind::Plain) {
            debug!(index = %index.name, table = %index.table_name, "Creating index");
            conn.execute_batch(&create_index_statement(index))?;
            created += 1;
        }
        Ok(created)
    }

    /// Insert the buffered rows of one table.
    pub fn flush(&self, inserter: &BatchInserter, buffer: &mut RowBuffer) -> ReplicaResult<usize> {
        let conn = self.conn()?;
        inserter.flush(&conn, buffer)
    }

    /// Record the replica's version and publications, and start the
    /// replication state at that version.
    pub fn initialize_replication(
        &self,
        publications: &[String],
        version: &LexiVersion,
    ) -> ReplicaResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(CREATE_REPLICATION_TABLES)?;
        conn.execute(
            r#"INSERT INTO "_litesync.replicationConfig" ("replicaVersion", "publications")
               VALUES (?1, ?2)"#,
            params![version.as_str(), serde_json::to_string(publications)?],
        )?;
        conn.execute(
            r#"INSERT INTO "_litesync.replicationState" ("stateVersion") VALUES (?1)"#,
            params![version.as_str()],
        )?;
        Ok(())
    }

    /// The recorded replication config, if the replica has been initialized.
    pub fn replication_config(&self) -> ReplicaResult<Option<ReplicationConfig>> {
        let conn = self.conn()?;
        if !table_exists(&conn, REPLICATION_CONFIG_TABLE)? {
            return Ok(None);
        }
        let row = conn
            .query_row(
                r#"SELECT "replicaVersion", "publications" FROM "_litesync.replicationConfig""#,
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((version, publications)) => Ok(Some(ReplicationConfig {
                replica_version: LexiVersion::parse(&version)?,
                publications: serde_json::from_str(&publications)?,
            })),
            None => Ok(None),
        }
    }

    /// The current replication cursor.
    pub fn replication_state(&self) -> ReplicaResult<Option<LexiVersion>> {
        let conn = self.conn()?;
        if !table_exists(&conn, REPLICATION_STATE_TABLE)? {
            return Ok(None);
        }
        let version: Option<String> = conn
            .query_row(
                r#"SELECT "stateVersion" FROM "_litesync.replicationState""#,
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map(|v| LexiVersion::parse(&v)).transpose()?)
    }

    pub fn is_initialized(&self) -> ReplicaResult<bool> {
        Ok(self.replication_config()?.is_some())
    }

    /// Replicated tables, excluding bookkeeping and full-text tables.
    pub fn table_names(&self) -> ReplicaResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
               AND name NOT LIKE '\\_litesync.%' ESCAPE '\\'
               AND sql NOT LIKE 'CREATE VIRTUAL TABLE%'
               AND name NOT IN (
                 SELECT m.name || suffix.s FROM sqlite_master m,
                   (SELECT '_data' AS s UNION ALL SELECT '_idx' UNION ALL SELECT '_docsize'
                    UNION ALL SELECT '_config' UNION ALL SELECT '_content') suffix
                 WHERE m.sql LIKE 'CREATE VIRTUAL TABLE%'
               )
             ORDER BY name",
        )?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    pub fn row_count(&self, table: &str) -> ReplicaResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", litesync_core::quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Run `f` with the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> ReplicaResult<T>,
    ) -> ReplicaResult<T> {
        let conn = self.conn()?;
        f(&conn)
    }
}

fn table_exists(conn: &Connection, name: &str) -> ReplicaResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Remove a replica database and its WAL side files.
pub fn remove_replica_files(path: impl AsRef<Path>) -> ReplicaResult<Vec<PathBuf>> {
    let path = path.as_ref();
    let mut removed = Vec::new();
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = PathBuf::from(file);
        if file.exists() {
            std::fs::remove_file(&file)?;
            removed.push(file);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use litesync_core::{
        map_postgres_to_lite, BufferLimits, ColumnSpec, LiteValue, PgTypeClass, PublicationFilter,
        PublishedTableSpec, SortDirection, INSERT_BATCH_SIZE,
    };

    fn column(name: &str, pos: i32, data_type: &str, type_oid: u32) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            pos,
            data_type: data_type.to_string(),
            type_oid,
            not_null: false,
            dflt: None,
            character_maximum_length: None,
            pg_type_class: Some(PgTypeClass::Base),
            elem_pg_type_class: None,
        }
    }

    fn items_table() -> LiteTableSpec {
        map_postgres_to_lite(&PublishedTableSpec {
            oid: 1,
            schema: "public".to_string(),
            name: "items".to_string(),
            columns: vec![
                column("id", 1, "int8", 20),
                column("name", 2, "text", 25),
                column("score", 3, "float8", 701),
            ],
            primary_key: vec!["id".to_string()],
            publications: [("pub".to_string(), PublicationFilter::default())]
                .into_iter()
                .collect(),
        })
    }

    fn insert_rows(replica: &Replica, count: usize, limits: BufferLimits) -> usize {
        let table = items_table();
        let watermark = LexiVersion::from_version(42);
        let inserter = BatchInserter::new(&table, &[false, true, false], &watermark);
        let mut buffer = RowBuffer::new(3, limits);
        let mut flushes = 0;
        for i in 0..count {
            buffer.push(LiteValue::Integer(i as i64));
            buffer.push(LiteValue::RawText(format!("item {i}").into_bytes().into()));
            if buffer.push(LiteValue::Real(i as f64 / 2.0)) {
                replica.flush(&inserter, &mut buffer).unwrap();
                flushes += 1;
            }
        }
        replica.flush(&inserter, &mut buffer).unwrap();
        flushes
    }

    #[test]
    fn test_batch_flush_row_counts() {
        for count in [
            0,
            1,
            INSERT_BATCH_SIZE - 1,
            INSERT_BATCH_SIZE,
            INSERT_BATCH_SIZE + 1,
            3 * INSERT_BATCH_SIZE + 7,
        ] {
            let replica = Replica::in_memory().unwrap();
            replica.create_tables(&[items_table()], &[]).unwrap();
            insert_rows(&replica, count, BufferLimits::default());
            assert_eq!(replica.row_count("items").unwrap(), count as u64, "count {count}");
        }
    }

    #[test]
    fn test_flush_on_capacity_and_bytes() {
        let replica = Replica::in_memory().unwrap();
        replica.create_tables(&[items_table()], &[]).unwrap();
        let limits = BufferLimits {
            max_rows: 100,
            max_bytes: usize::MAX,
        };
        let flushes = insert_rows(&replica, 230, limits);
        assert_eq!(flushes, 2);
        assert_eq!(replica.row_count("items").unwrap(), 230);

        let replica = Replica::in_memory().unwrap();
        replica.create_tables(&[items_table()], &[]).unwrap();
        let flushes = insert_rows(&replica, 120, BufferLimits { max_rows: 10_000, max_bytes: 256 });
        assert!(flushes > 1);
        assert_eq!(replica.row_count("items").unwrap(), 120);
    }

    #[test]
    fn test_values_and_watermark() {
        let replica = Replica::in_memory().unwrap();
        replica.create_tables(&[items_table()], &[]).unwrap();
        insert_rows(&replica, 3, BufferLimits::default());

        replica
            .with_connection(|conn| {
                let (name, kind, score, version): (String, String, f64, String) = conn.query_row(
                    "SELECT name, typeof(name), score, _0_version FROM items WHERE id = 2",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;
                assert_eq!(name, "item 2");
                assert_eq!(kind, "text");
                assert_eq!(score, 1.0);
                assert_eq!(version, LexiVersion::from_version(42).as_str());

                let versions: i64 = conn.query_row(
                    "SELECT COUNT(DISTINCT _0_version) FROM items",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(versions, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_all_null_row() {
        let replica = Replica::in_memory().unwrap();
        let mut table = items_table();
        table.primary_key.clear();
        replica.create_tables(&[table.clone()], &[]).unwrap();

        let inserter =
            BatchInserter::new(&table, &[false, true, false], &LexiVersion::from_version(7));
        let mut buffer = RowBuffer::new(3, BufferLimits::default());
        for _ in 0..3 {
            buffer.push(LiteValue::Null);
        }
        replica.flush(&inserter, &mut buffer).unwrap();

        let nulls: i64 = replica
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM items WHERE id IS NULL AND name IS NULL AND score IS NULL",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_fulltext_index_tracks_inserts() {
        let replica = Replica::in_memory().unwrap();
        let fts = LiteIndexSpec {
            name: "items_name_fts".to_string(),
            table_name: "items".to_string(),
            unique: false,
            columns: vec![("name".to_string(), SortDirection::Asc)],
            kind: IndexKind::Fulltext,
        };
        let plain = LiteIndexSpec {
            name: "items_score_idx".to_string(),
            table_name: "items".to_string(),
            unique: false,
            columns: vec![("score".to_string(), SortDirection::Desc)],
            kind: IndexKind::Plain,
        };
        let indexes = vec![fts, plain];
        replica.create_tables(&[items_table()], &indexes).unwrap();
        insert_rows(&replica, 60, BufferLimits::default());
        assert_eq!(replica.create_indexes(&indexes).unwrap(), 1);

        let hits: i64 = replica
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM \"items_name_fts\" WHERE \"items_name_fts\" MATCH '\"item 42\"'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(hits, 1);
        assert_eq!(replica.table_names().unwrap(), vec!["items".to_string()]);
    }

    #[test]
    fn test_replication_bookkeeping() {
        let replica = Replica::in_memory().unwrap();
        assert!(!replica.is_initialized().unwrap());
        assert!(replica.replication_state().unwrap().is_none());

        let version = LexiVersion::from_lsn(0x16B3748);
        let publications = vec!["_zero_public_0".to_string()];
        replica.initialize_replication(&publications, &version).unwrap();

        let config = replica.replication_config().unwrap().unwrap();
        assert_eq!(config.replica_version, version);
        assert_eq!(config.publications, publications);
        assert_eq!(replica.replication_state().unwrap(), Some(version));
        assert!(replica.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_sync() {
        let replica = Replica::in_memory().unwrap();
        replica.begin().unwrap();
        replica.create_tables(&[items_table()], &[]).unwrap();
        insert_rows(&replica, 10, BufferLimits::default());
        replica.rollback().unwrap();
        assert!(replica.table_names().unwrap().is_empty());
        // No transaction left open.
        replica.rollback().unwrap();
    }

    #[test]
    fn test_open_file_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        {
            let replica = Replica::open(&path).unwrap();
            replica
                .initialize_replication(&[], &LexiVersion::from_version(1))
                .unwrap();
        }
        assert!(Replica::open(&path).unwrap().is_initialized().unwrap());
        let removed = remove_replica_files(&path).unwrap();
        assert!(removed.contains(&path));
        assert!(!path.exists());
    }
}
