//! Mapping of upstream Postgres schema onto the replica.

use crate::error::{Error, Result};
use crate::schema::{
    ColumnSpec, IndexSpec, LiteColumn, LiteIndexSpec, LiteTableSpec, PublishedTableSpec,
};

/// Column appended to every replica table holding the row's version.
pub const VERSION_COLUMN: &str = "_0_version";

const NOT_NULL_ATTRIBUTE: &str = "|NOT_NULL";
const TEXT_ENUM_ATTRIBUTE: &str = "|TEXT_ENUM";

/// Quote an identifier for use in SQL (double quotes).
///
/// Postgres and SQLite share the same quoting rule.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Whether a name is one the replica can carry unchanged.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Name of the replica table for an upstream table. Tables outside the
/// `public` schema keep their schema as a prefix.
pub fn lite_table_name(schema: &str, name: &str) -> String {
    if schema == "public" {
        name.to_string()
    } else {
        format!("{}.{}", schema, name)
    }
}

/// Declared type of a replica column. Upstream attributes that SQLite cannot
/// express are appended to the type name.
pub fn lite_type_string(column: &ColumnSpec) -> String {
    let mut type_string = column.data_type.clone();
    if column.not_null {
        type_string.push_str(NOT_NULL_ATTRIBUTE);
    }
    if column.is_enum() {
        type_string.push_str(TEXT_ENUM_ATTRIBUTE);
    }
    type_string
}

/// Strip attributes from a declared lite type, e.g. `int4|NOT_NULL` -> `int4`.
pub fn upstream_type_name(lite_type: &str) -> &str {
    lite_type.split('|').next().unwrap_or(lite_type)
}

/// Reject tables the replica cannot represent faithfully.
pub fn validate_table(table: &PublishedTableSpec) -> Result<()> {
    let unsupported = |reason: String| Error::UnsupportedTable {
        table: table.display_name(),
        reason,
    };

    if !is_valid_identifier(&table.schema) {
        return Err(unsupported(format!(
            "schema name {:?} contains unsupported characters",
            table.schema
        )));
    }
    if !is_valid_identifier(&table.name) {
        return Err(unsupported(format!(
            "table name {:?} contains unsupported characters",
            table.name
        )));
    }
    if table.columns.is_empty() {
        return Err(unsupported("table has no published columns".to_string()));
    }
    for column in &table.columns {
        if !is_valid_identifier(&column.name) {
            return Err(unsupported(format!(
                "column name {:?} contains unsupported characters",
                column.name
            )));
        }
        if column.name == VERSION_COLUMN {
            return Err(unsupported(format!(
                "column name {:?} is reserved",
                VERSION_COLUMN
            )));
        }
    }
    for key in &table.primary_key {
        if !table.columns.iter().any(|c| &c.name == key) {
            return Err(unsupported(format!(
                "primary key column {:?} is not published",
                key
            )));
        }
    }
    Ok(())
}

/// Derive the replica table for a published table.
pub fn map_postgres_to_lite(table: &PublishedTableSpec) -> LiteTableSpec {
    let sorted = table.sorted_columns();
    let mut columns: Vec<LiteColumn> = sorted
        .iter()
        .map(|c| LiteColumn {
            name: c.name.clone(),
            pos: c.pos,
            data_type: lite_type_string(c),
        })
        .collect();

    let next_pos = sorted.last().map(|c| c.pos + 1).unwrap_or(1);
    columns.push(LiteColumn {
        name: VERSION_COLUMN.to_string(),
        pos: next_pos,
        data_type: "TEXT".to_string(),
    });

    LiteTableSpec {
        name: lite_table_name(&table.schema, &table.name),
        columns,
        primary_key: table.primary_key.clone(),
    }
}

/// Derive the replica index for an upstream index.
pub fn map_postgres_to_lite_index(index: &IndexSpec) -> LiteIndexSpec {
    LiteIndexSpec {
        name: lite_table_name(&index.schema, &index.name),
        table_name: lite_table_name(&index.schema, &index.table_name),
        unique: index.unique,
        columns: index.columns.clone(),
        kind: index.kind,
    }
}
