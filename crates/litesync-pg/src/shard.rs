//! Upstream bookkeeping for a shard: its schema, publications and replicas.

use litesync_core::{quote_ident, LexiVersion, PublishedSchema, ShardConfig};
use postgres_protocol::escape::escape_literal;
use tokio_postgres::Client;
use tracing::{info, warn};

use crate::error::PgResult;
use crate::replication::publication::{
    create_publication_for_schema_sql, create_publication_for_tables_sql, drop_publication,
    existing_publications, missing_publications,
};
use crate::replication::slot::{drop_replication_slot, shard_slots};

/// Outcome of checking the shard's recorded publications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardCheck {
    Ready,
    /// Publications requested differ from those the shard was set up with.
    Mismatch {
        recorded: Vec<String>,
        requested: Vec<String>,
    },
    /// Recorded publications no longer exist upstream.
    Missing(Vec<String>),
}

/// DDL creating the shard schema, its tables and internal publications.
pub fn shard_setup_sql(shard: &ShardConfig) -> String {
    let schema = quote_ident(&shard.schema());
    let requested = shard.requested_publications();
    let publications = requested
        .iter()
        .map(|p| escape_literal(p))
        .collect::<Vec<_>>()
        .join(",");

    let mut sql = format!(
        r#"
CREATE SCHEMA IF NOT EXISTS {schema};
CREATE TABLE IF NOT EXISTS {schema}."clients" (
  "clientGroupID"  TEXT NOT NULL,
  "clientID"       TEXT NOT NULL,
  "lastMutationID" BIGINT NOT NULL,
  "userID"         TEXT,
  PRIMARY KEY ("clientGroupID", "clientID")
);
CREATE TABLE IF NOT EXISTS {schema}."replicas" (
  "slot"          TEXT PRIMARY KEY,
  "version"       TEXT NOT NULL,
  "initialSchema" JSON NOT NULL
);
CREATE TABLE IF NOT EXISTS {schema}."shardConfig" (
  "publications"  TEXT[] NOT NULL,
  "ddlDetection"  BOOL NOT NULL,
  "lock"          BOOL PRIMARY KEY DEFAULT true CHECK ("lock")
);
INSERT INTO {schema}."shardConfig" ("publications", "ddlDetection")
  VALUES (ARRAY[{publications}]::TEXT[], false)
  ON CONFLICT DO NOTHING;
{metadata};
"#,
        metadata = create_publication_for_tables_sql(
            &shard.metadata_publication(),
            &[(shard.schema(), "clients".to_string())],
        ),
    );

    if shard.publications.is_empty() {
        sql.push_str(&create_publication_for_schema_sql(
            &shard.default_publication(),
            "public",
        ));
        sql.push_str(";\n");
    }
    sql
}

/// Whether the shard's `shardConfig` table exists.
pub async fn shard_exists(client: &Client, shard: &ShardConfig) -> PgResult<bool> {
    let table = format!("{}.\"shardConfig\"", quote_ident(&shard.schema()));
    let exists: bool = client
        .query_one("SELECT to_regclass($1) IS NOT NULL", &[&table])
        .await?
        .get(0);
    Ok(exists)
}

/// Publications recorded when the shard was set up.
pub async fn recorded_publications(client: &Client, shard: &ShardConfig) -> PgResult<Vec<String>> {
    let row = client
        .query_one(
            &format!(
                r#"SELECT "publications" FROM {}."shardConfig""#,
                quote_ident(&shard.schema())
            ),
            &[],
        )
        .await?;
    let mut publications: Vec<String> = row.get(0);
    publications.sort();
    Ok(publications)
}

/// Create the shard schema if needed and verify its publications.
pub async fn ensure_shard(client: &Client, shard: &ShardConfig) -> PgResult<ShardCheck> {
    if !shard_exists(client, shard).await? {
        info!(shard = %shard.schema(), "Setting up shard schema and publications");
        client
            .batch_execute(&format!("BEGIN;\n{}COMMIT;", shard_setup_sql(shard)))
            .await?;
    }

    let recorded = recorded_publications(client, shard).await?;
    let requested = shard.requested_publications();
    if recorded != requested {
        return Ok(ShardCheck::Mismatch {
            recorded,
            requested,
        });
    }

    let mut required = recorded;
    required.push(shard.metadata_publication());
    let existing = existing_publications(client, &required).await?;
    let missing = missing_publications(&required, &existing);
    if missing.is_empty() {
        Ok(ShardCheck::Ready)
    } else {
        Ok(ShardCheck::Missing(missing))
    }
}

/// Drop the shard schema and its internal publications. Slots are left alone.
pub async fn drop_shard_schema(client: &Client, shard: &ShardConfig) -> PgResult<()> {
    warn!(shard = %shard.schema(), "Dropping shard schema");
    client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(&shard.schema())
        ))
        .await?;
    drop_publication(client, &shard.metadata_publication()).await?;
    drop_publication(client, &shard.default_publication()).await?;
    Ok(())
}

/// Drop the shard schema, publications and every slot of the shard.
pub async fn drop_shard(client: &Client, shard: &ShardConfig) -> PgResult<Vec<String>> {
    drop_shard_schema(client, shard).await?;
    let mut dropped = Vec::new();
    for slot in shard_slots(client, shard).await? {
        drop_replication_slot(client, &slot.slot_name).await?;
        dropped.push(slot.slot_name);
    }
    Ok(dropped)
}

/// Record a fully synced replica against the shard.
pub async fn register_replica(
    client: &Client,
    shard: &ShardConfig,
    slot_name: &str,
    version: &LexiVersion,
    schema: &PublishedSchema,
) -> PgResult<()> {
    let initial_schema = serde_json::to_value(schema)?;
    client
        .execute(
            &format!(
                r#"INSERT INTO {}."replicas" ("slot", "version", "initialSchema")
                   VALUES ($1, $2, $3)"#,
                quote_ident(&shard.schema())
            ),
            &[&slot_name, &version.as_str(), &initial_schema],
        )
        .await?;
    info!(slot = %slot_name, version = %version, "Registered replica");
    Ok(())
}

/// A replica row from the shard's `replicas` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaRecord {
    pub slot: String,
    pub version: String,
}

pub async fn registered_replicas(
    client: &Client,
    shard: &ShardConfig,
) -> PgResult<Vec<ReplicaRecord>> {
    if !shard_exists(client, shard).await? {
        return Ok(Vec::new());
    }
    let rows = client
        .query(
            &format!(
                r#"SELECT "slot", "version" FROM {}."replicas" ORDER BY "version""#,
                quote_ident(&shard.schema())
            ),
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| ReplicaRecord {
            slot: r.get(0),
            version: r.get(1),
        })
        .collect())
}
