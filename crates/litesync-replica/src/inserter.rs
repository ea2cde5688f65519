//! Multi-row prepared inserts from a [`RowBuffer`].

use litesync_core::{
    quote_ident, LexiVersion, LiteTableSpec, LiteValue, RowBuffer, INSERT_BATCH_SIZE,
};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::Connection;

use crate::error::{ReplicaError, ReplicaResult};

/// Writes buffered rows of one table, stamping each with the watermark.
#[derive(Debug, Clone)]
pub struct BatchInserter {
    table: String,
    columns: usize,
    watermark: String,
    batch_sql: String,
    single_sql: String,
}

impl BatchInserter {
    /// `table` includes the trailing version column; `raw_text` flags the
    /// source columns whose values are cast to TEXT by SQLite.
    pub fn new(table: &LiteTableSpec, raw_text: &[bool], watermark: &LexiVersion) -> Self {
        let names: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let mut placeholders: Vec<&str> = raw_text
            .iter()
            .map(|&raw| if raw { "CAST(? AS TEXT)" } else { "?" })
            .collect();
        placeholders.push("?");
        let row = format!("({})", placeholders.join(","));

        let prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            quote_ident(&table.name),
            names.join(",")
        );
        let batch_sql = format!(
            "{prefix}{}",
            vec![row.as_str(); INSERT_BATCH_SIZE].join(",")
        );
        let single_sql = format!("{prefix}{row}");

        Self {
            table: table.name.clone(),
            columns: raw_text.len(),
            watermark: watermark.to_string(),
            batch_sql,
            single_sql,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert every complete row in `buffer` and clear it. Full batches go
    /// through the multi-row statement, the remainder one row at a time.
    pub fn flush(&self, conn: &Connection, buffer: &mut RowBuffer) -> ReplicaResult<usize> {
        if buffer.columns() != self.columns {
            return Err(ReplicaError::ColumnMismatch {
                table: self.table.clone(),
                expected: self.columns,
                got: buffer.columns(),
            });
        }
        let rows = buffer.rows();
        if rows == 0 {
            return Ok(0);
        }

        let values = buffer.complete_rows();
        let batch_len = self.columns * INSERT_BATCH_SIZE;
        let full = values.len() / batch_len * batch_len;

        if full > 0 {
            let mut stmt = conn.prepare_cached(&self.batch_sql)?;
            for batch in values[..full].chunks(batch_len) {
                self.bind_rows(&mut stmt, batch)?;
                stmt.raw_execute()?;
            }
        }
        if full < values.len() {
            let mut stmt = conn.prepare_cached(&self.single_sql)?;
            for row in values[full..].chunks(self.columns) {
                self.bind_rows(&mut stmt, row)?;
                stmt.raw_execute()?;
            }
        }

        buffer.clear();
        Ok(rows)
    }

    fn bind_rows(
        &self,
        stmt: &mut rusqlite::Statement<'_>,
        values: &[LiteValue],
    ) -> ReplicaResult<()> {
        let mut index = 1;
        for row in values.chunks(self.columns) {
            for value in row {
                stmt.raw_bind_parameter(index, to_sql(value))?;
                index += 1;
            }
            stmt.raw_bind_parameter(index, self.watermark.as_str())?;
            index += 1;
        }
        Ok(())
    }
}

fn to_sql(value: &LiteValue) -> ToSqlOutput<'_> {
    let value = match value {
        LiteValue::Null => ValueRef::Null,
        LiteValue::Integer(i) => ValueRef::Integer(*i),
        LiteValue::Real(f) => ValueRef::Real(*f),
        LiteValue::Text(s) => ValueRef::Text(s.as_bytes()),
        // Cast to TEXT by the statement.
        LiteValue::RawText(b) => ValueRef::Blob(b),
        LiteValue::Blob(b) => ValueRef::Blob(b),
    };
    ToSqlOutput::Borrowed(value)
}
