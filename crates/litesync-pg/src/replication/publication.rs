//! Publication management.

use litesync_core::quote_ident;
use tokio_postgres::Client;
use tracing::info;

use crate::error::PgResult;

/// Quote a schema-qualified table name (e.g., `"public"."users"`).
pub fn quote_table_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Check if a publication exists.
pub async fn publication_exists(client: &Client, publication_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_publication WHERE pubname = $1)",
            &[&publication_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// The subset of `names` that exist upstream, sorted.
pub async fn existing_publications(client: &Client, names: &[String]) -> PgResult<Vec<String>> {
    let rows = client
        .query(
            "SELECT pubname::text FROM pg_publication WHERE pubname = ANY($1) ORDER BY pubname",
            &[&names],
        )
        .await?;

    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Names in `required` that are absent from `existing`.
pub fn missing_publications(required: &[String], existing: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !existing.contains(name))
        .cloned()
        .collect()
}

/// Statement creating a publication over every table in a schema.
pub fn create_publication_for_schema_sql(publication_name: &str, schema: &str) -> String {
    format!(
        "CREATE PUBLICATION {} FOR TABLES IN SCHEMA {}",
        quote_ident(publication_name),
        quote_ident(schema)
    )
}

/// Statement creating a publication for specific tables.
pub fn create_publication_for_tables_sql(
    publication_name: &str,
    tables: &[(String, String)],
) -> String {
    let quoted_tables = tables
        .iter()
        .map(|(schema, table)| quote_table_name(schema, table))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE PUBLICATION {} FOR TABLE {}",
        quote_ident(publication_name),
        quoted_tables
    )
}

/// Drop a publication.
pub async fn drop_publication(client: &Client, publication_name: &str) -> PgResult<()> {
    info!(publication = %publication_name, "Dropping publication");
    client
        .batch_execute(&format!(
            "DROP PUBLICATION IF EXISTS {}",
            quote_ident(publication_name)
        ))
        .await?;

    Ok(())
}
