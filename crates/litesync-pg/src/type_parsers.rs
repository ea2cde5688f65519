//! Loads the upstream type catalog into a `TypeRegistry`.

use litesync_core::{PgTypeClass, PgTypeInfo, TypeRegistry};
use tokio_postgres::Client;
use tracing::debug;

use crate::error::PgResult;

const TYPES_QUERY: &str = "SELECT oid::int8, typname::text, typtype::text, typcategory::text, \
     typelem::int8, typbasetype::int8 FROM pg_type";

/// Read every `pg_type` row so domains, enums and user arrays resolve.
///
/// Runs in simple-query mode: only text comes back, which keeps loading
/// a large catalog cheap.
pub async fn load_type_registry(client: &Client) -> PgResult<TypeRegistry> {
    let messages = client.simple_query(TYPES_QUERY).await?;
    let types: Vec<PgTypeInfo> = messages
        .iter()
        .filter_map(|m| match m {
            tokio_postgres::SimpleQueryMessage::Row(row) => type_info(
                row.get(0),
                row.get(1),
                row.get(2),
                row.get(3),
                row.get(4),
                row.get(5),
            ),
            _ => None,
        })
        .collect();
    debug!(types = types.len(), "Loaded upstream types");
    Ok(TypeRegistry::from_types(types))
}

fn type_info(
    oid: Option<&str>,
    name: Option<&str>,
    typtype: Option<&str>,
    category: Option<&str>,
    elem: Option<&str>,
    base: Option<&str>,
) -> Option<PgTypeInfo> {
    let oid = oid?.parse().ok()?;
    Some(PgTypeInfo {
        oid,
        name: name?.to_string(),
        class: typtype.and_then(PgTypeClass::from_typtype),
        category: category.and_then(|c| c.chars().next()).unwrap_or('X'),
        elem_oid: elem.and_then(|e| e.parse().ok()).unwrap_or(0),
        base_oid: base.and_then(|b| b.parse().ok()).unwrap_or(0),
    })
}
