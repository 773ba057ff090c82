//! Batch planning
//!
//! Splits one table into an ordered, gap-free, non-overlapping sequence of
//! batches. Tables with a usable primary key are split on key boundaries;
//! everything else falls back to offset/limit over all columns.

use crate::adapters::database::DatabaseClient;
use crate::domain::{Batch, Result, RowRange, TableDescriptor, TabportError, Value};

/// What to plan for one table
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub table: &'a TableDescriptor,
    pub batch_size: usize,
    /// WHERE predicate applied to every batch
    pub filter: Option<&'a str>,
    /// Custom query replacing the table scan
    pub query: Option<&'a str>,
}

/// Plan the batches of one table
///
/// # Errors
///
/// Returns a configuration error for a zero batch size, and propagates
/// database errors from counting or boundary lookups.
pub async fn plan_table(db: &dyn DatabaseClient, request: PlanRequest<'_>) -> Result<Vec<Batch>> {
    let table = request.table;

    if request.batch_size == 0 {
        return Err(TabportError::Configuration(
            "batch_size must be greater than zero".to_string(),
        ));
    }

    if let Some(query) = request.query {
        tracing::debug!(table = %table.name, "Planning single custom-query batch");
        return Ok(vec![Batch::new(
            &table.name,
            0,
            RowRange::Query(query.to_string()),
        )]);
    }

    let batches = if table.has_usable_key() {
        let boundaries = db
            .key_boundaries(table, request.filter, request.batch_size)
            .await?;
        key_batches(&table.name, boundaries)
    } else {
        let rows = db.count_rows(table, request.filter).await?;
        tracing::debug!(
            table = %table.name,
            rows,
            "No usable primary key, planning offset batches"
        );
        offset_batches(&table.name, rows, request.batch_size as u64)
    };

    tracing::debug!(
        table = %table.name,
        batches = batches.len(),
        batch_size = request.batch_size,
        "Planned table"
    );

    Ok(batches)
}

/// Batches covering `[boundary_i, boundary_{i+1})`, the last one open above
pub fn key_batches(table: &str, boundaries: Vec<Vec<Value>>) -> Vec<Batch> {
    let uppers: Vec<Option<Vec<Value>>> = boundaries
        .iter()
        .skip(1)
        .cloned()
        .map(Some)
        .chain(std::iter::once(None))
        .collect();

    boundaries
        .into_iter()
        .zip(uppers)
        .enumerate()
        .map(|(sequence, (lower, upper))| {
            Batch::new(table, sequence, RowRange::Key { lower, upper })
        })
        .collect()
}

/// `ceil(rows / batch_size)` offset batches
pub fn offset_batches(table: &str, rows: u64, batch_size: u64) -> Vec<Batch> {
    let count = rows.div_ceil(batch_size);
    (0..count)
        .map(|i| {
            Batch::new(
                table,
                i as usize,
                RowRange::Offset {
                    offset: i * batch_size,
                    limit: batch_size,
                },
            )
        })
        .collect()
}
