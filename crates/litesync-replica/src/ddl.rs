//! DDL for replica tables and indexes.

use litesync_core::{quote_ident, IndexKind, LiteIndexSpec, LiteTableSpec, VERSION_COLUMN};

/// `CREATE TABLE` for a replica table. Column types are quoted so that
/// attribute suffixes such as `|NOT_NULL` survive.
pub fn create_table_statement(table: &LiteTableSpec) -> String {
    let mut defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            if c.name == VERSION_COLUMN {
                format!("{} TEXT NOT NULL", quote_ident(&c.name))
            } else {
                format!("{} {}", quote_ident(&c.name), quote_ident(&c.data_type))
            }
        })
        .collect();

    if !table.primary_key.is_empty() {
        let keys: Vec<String> = table.primary_key.iter().map(|k| quote_ident(k)).collect();
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote_ident(&table.name),
        defs.join(",\n  ")
    )
}

/// `CREATE INDEX` for a plain index. Full-text indexes are created with
/// their table by [`create_fulltext_statements`].
pub fn create_index_statement(index: &LiteIndexSpec) -> String {
    let columns: Vec<String> = index
        .columns
        .iter()
        .map(|(name, dir)| format!("{} {}", quote_ident(name), dir.as_sql()))
        .collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(&index.table_name),
        columns.join(", ")
    )
}

/// An FTS5 table over the indexed columns plus the insert, delete and
/// update triggers that keep it in step with the base table by rowid.
pub fn create_fulltext_statements(index: &LiteIndexSpec) -> Vec<String> {
    debug_assert_eq!(index.kind, IndexKind::Fulltext);

    let fts = quote_ident(&index.name);
    let table = quote_ident(&index.table_name);
    let columns: Vec<String> = index.columns.iter().map(|(c, _)| quote_ident(c)).collect();
    let column_list = columns.join(", ");
    let values = |prefix: &str| {
        columns
            .iter()
            .map(|c| format!("{prefix}.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let trigger = |suffix: &str| quote_ident(&format!("{}_{}", index.name, suffix));

    let insert_new = format!(
        "INSERT INTO {fts} (rowid, {column_list}) VALUES (new.rowid, {});",
        values("new")
    );
    let delete_old = format!(
        "INSERT INTO {fts} ({fts}, rowid, {column_list}) VALUES ('delete', old.rowid, {});",
        values("old")
    );

    vec![
        format!(
            "CREATE VIRTUAL TABLE {fts} USING fts5({column_list}, content={}, content_rowid='rowid')",
            quote_literal(&index.table_name)
        ),
        format!(
            "CREATE TRIGGER {} AFTER INSERT ON {table} BEGIN {insert_new} END",
            trigger("ai")
        ),
        format!(
            "CREATE TRIGGER {} AFTER DELETE ON {table} BEGIN {delete_old} END",
            trigger("ad")
        ),
        format!(
            "CREATE TRIGGER {} AFTER UPDATE ON {table} BEGIN {delete_old} {insert_new} END",
            trigger("au")
        ),
    ]
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
