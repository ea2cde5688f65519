//! Copies one published table into the replica.

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use litesync_core::{
    map_postgres_to_lite, quote_ident, BufferLimits, CopyTextParser, LexiVersion, LiteTableSpec,
    PublishedTableSpec, RowBuffer, RowConverter, TypeParsers,
};
use litesync_replica::{BatchInserter, Replica};
use tokio_postgres::Client;
use tracing::{debug, info};

use super::error::{SyncError, SyncResult};

/// Rows copied for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCopyStats {
    pub table: String,
    pub rows: u64,
    pub elapsed: Duration,
}

/// `SELECT` of a table's published columns, restricted to rows matching any
/// publication's row filter. A publication without a filter publishes all
/// rows, so no filter applies then.
pub fn select_statement(table: &PublishedTableSpec) -> String {
    let columns = table
        .sorted_columns()
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(",");
    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        columns,
        quote_ident(&table.schema),
        quote_ident(&table.name)
    );

    let filters: Option<Vec<&str>> = table
        .publications
        .values()
        .map(|p| p.row_filter.as_deref())
        .collect();
    if let Some(filters) = filters.filter(|f| !f.is_empty()) {
        let condition = filters
            .iter()
            .map(|f| format!("({})", f))
            .collect::<Vec<_>>()
            .join(" OR ");
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }
    sql
}

pub fn copy_statement(select: &str) -> String {
    format!("COPY ({}) TO STDOUT", select)
}

/// Stream the table's COPY output into the replica.
pub async fn copy_table(
    client: &Client,
    table: &PublishedTableSpec,
    replica: &Replica,
    types: &dyn TypeParsers,
    watermark: &LexiVersion,
    limits: BufferLimits,
) -> SyncResult<TableCopyStats> {
    let start = Instant::now();
    let lite = map_postgres_to_lite(table);
    let select = select_statement(table);
    debug!(table = %lite.name, %select, "Starting table copy");

    let stream = client.copy_out(&copy_statement(&select)).await?;
    let rows = load_copy_stream(stream, table, &lite, replica, types, watermark, limits).await?;

    let stats = TableCopyStats {
        table: lite.name,
        rows,
        elapsed: start.elapsed(),
    };
    info!(
        table = %stats.table,
        rows,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "Finished copying table"
    );
    Ok(stats)
}

/// Parse COPY text chunks, convert each field and insert rows in batches.
/// Returns the number of rows inserted.
pub async fn load_copy_stream<S, E>(
    stream: S,
    table: &PublishedTableSpec,
    lite: &LiteTableSpec,
    replica: &Replica,
    types: &dyn TypeParsers,
    watermark: &LexiVersion,
    limits: BufferLimits,
) -> SyncResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    SyncError: From<E>,
{
    let converter = RowConverter::new(table.sorted_columns(), types);
    let inserter = BatchInserter::new(lite, &converter.raw_text_columns(), watermark);
    let mut buffer = RowBuffer::new(converter.len(), limits);
    let mut parser = CopyTextParser::new();
    let copy_error = |source| SyncError::Copy {
        table: lite.name.clone(),
        source,
    };

    let mut column = 0;
    let mut rows = 0u64;
    let mut stream = std::pin::pin!(stream);
    while let Some(chunk) = stream.try_next().await? {
        for field in parser.parse(chunk).map_err(copy_error)? {
            let value = converter.convert(column, field).map_err(copy_error)?;
            column += 1;
            if column == converter.len() {
                column = 0;
                rows += 1;
            }
            if buffer.push(value) {
                replica.flush(&inserter, &mut buffer)?;
            }
        }
    }

    parser.finish().map_err(copy_error)?;
    if column != 0 {
        return Err(copy_error(litesync_core::Error::TruncatedRow {
            got: column,
            expected: converter.len(),
        }));
    }
    replica.flush(&inserter, &mut buffer)?;
    Ok(rows)
}
