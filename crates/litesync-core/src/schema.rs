//! Upstream and replica schema descriptions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Postgres `pg_type.typtype` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PgTypeClass {
    Base,
    Composite,
    Domain,
    Enum,
    Pseudo,
    Range,
    Multirange,
}

impl PgTypeClass {
    /// Map the single-character `typtype` code.
    pub fn from_typtype(code: &str) -> Option<Self> {
        match code {
            "b" => Some(PgTypeClass::Base),
            "c" => Some(PgTypeClass::Composite),
            "d" => Some(PgTypeClass::Domain),
            "e" => Some(PgTypeClass::Enum),
            "p" => Some(PgTypeClass::Pseudo),
            "r" => Some(PgTypeClass::Range),
            "m" => Some(PgTypeClass::Multirange),
            _ => None,
        }
    }
}

/// A published column. Columns are ordered by `pos`, which is also the
/// order of fields in the table's COPY output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub name: String,
    pub pos: i32,
    /// Type name; arrays are rendered as `elem[]`.
    pub data_type: String,
    #[serde(rename = "typeOID")]
    pub type_oid: u32,
    pub not_null: bool,
    pub dflt: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub pg_type_class: Option<PgTypeClass>,
    /// Type class of the element type when the column is an array.
    pub elem_pg_type_class: Option<PgTypeClass>,
}

impl ColumnSpec {
    pub fn is_array(&self) -> bool {
        self.elem_pg_type_class.is_some()
    }

    pub fn is_enum(&self) -> bool {
        let class = self.elem_pg_type_class.or(self.pg_type_class);
        class == Some(PgTypeClass::Enum)
    }
}

/// Row filter of one publication for a table. `None` publishes every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationFilter {
    pub row_filter: Option<String>,
}

/// A table as discovered upstream inside the sync snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedTableSpec {
    pub oid: u32,
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub publications: BTreeMap<String, PublicationFilter>,
}

impl PublishedTableSpec {
    /// `schema.name`, unquoted; for logging.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Columns sorted by position.
    pub fn sorted_columns(&self) -> Vec<&ColumnSpec> {
        let mut columns: Vec<&ColumnSpec> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.pos);
        columns
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Plain,
    /// Full-text index; becomes an FTS5 table kept in sync by triggers.
    Fulltext,
}

/// An upstream index on a published table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub schema: String,
    pub table_name: String,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<(String, SortDirection)>,
    #[serde(default)]
    pub kind: IndexKind,
}

/// Everything the publications expose, read in one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedSchema {
    pub tables: Vec<PublishedTableSpec>,
    pub indexes: Vec<IndexSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteColumn {
    pub name: String,
    pub pos: i32,
    pub data_type: String,
}

/// A table in the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteTableSpec {
    pub name: String,
    pub columns: Vec<LiteColumn>,
    pub primary_key: Vec<String>,
}

impl LiteTableSpec {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// An index in the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteIndexSpec {
    pub name: String,
    pub table_name: String,
    pub unique: bool,
    pub columns: Vec<(String, SortDirection)>,
    pub kind: IndexKind,
}
