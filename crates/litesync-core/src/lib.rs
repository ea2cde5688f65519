pub mod batcher;
pub mod copy;
pub mod error;
pub mod lexi;
pub mod mapping;
pub mod schema;
pub mod shard;
pub mod transform;
pub mod types;

pub use batcher::{
    BufferLimits, RowBuffer, BUFFERED_SIZE_THRESHOLD, INSERT_BATCH_SIZE, MAX_BUFFERED_ROWS,
};
pub use copy::{CopyField, CopyTextParser};
pub use error::{Error, Result};
pub use lexi::LexiVersion;
pub use mapping::{
    is_valid_identifier, lite_table_name, map_postgres_to_lite, map_postgres_to_lite_index,
    quote_ident, validate_table, VERSION_COLUMN,
};
pub use schema::{
    ColumnSpec, IndexKind, IndexSpec, LiteColumn, LiteIndexSpec, LiteTableSpec, PgTypeClass,
    PublicationFilter, PublishedSchema, PublishedTableSpec, SortDirection,
};
pub use shard::ShardConfig;
pub use transform::{PgTypeInfo, RowConverter, TypeParsers, TypeRegistry, ValueParser};
pub use types::LiteValue;
