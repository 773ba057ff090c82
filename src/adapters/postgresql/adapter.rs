//! PostgreSQL adapter implementing the database trait
//!
//! Reads use typed select lists so integers, floats and booleans come back
//! as such and everything else travels as its text rendering. Writes bind
//! every value as text and cast it to the column type on the server.

use crate::adapters::database::traits::{ApplyOptions, ApplyOutcome, DatabaseClient, OnConflict};
use crate::adapters::postgresql::client::{map_pg_error, PostgreSQLClient};
use crate::core::codec::format_float;
use crate::core::codec::sql::quote_ident;
use crate::domain::{Column, Result, RowRange, RowSet, TableDescriptor, TabportError, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

/// Bind parameters allowed in one statement
const MAX_PARAMS: usize = 65_535;

/// How a column is read back from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    fn from_udt(udt: &str) -> Self {
        match udt {
            "int2" | "int4" | "int8" => ColumnKind::Int,
            "float4" | "float8" => ColumnKind::Float,
            "bool" => ColumnKind::Bool,
            _ => ColumnKind::Text,
        }
    }

    fn from_type(ty: &Type) -> Self {
        if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 {
            ColumnKind::Int
        } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
            ColumnKind::Float
        } else if *ty == Type::BOOL {
            ColumnKind::Bool
        } else {
            ColumnKind::Text
        }
    }

    fn select_expr(&self, column: &str) -> String {
        let ident = quote_ident(column);
        match self {
            ColumnKind::Int => format!("{ident}::int8"),
            ColumnKind::Float => format!("{ident}::float8"),
            ColumnKind::Bool => ident,
            ColumnKind::Text => format!("{ident}::text"),
        }
    }

    fn read(&self, row: &Row, index: usize) -> Result<Value> {
        let context = "Failed to read column";
        let value = match self {
            ColumnKind::Int => row
                .try_get::<_, Option<i64>>(index)
                .map_err(|e| map_pg_error(context, e))?
                .into(),
            ColumnKind::Float => row
                .try_get::<_, Option<f64>>(index)
                .map_err(|e| map_pg_error(context, e))?
                .into(),
            ColumnKind::Bool => row
                .try_get::<_, Option<bool>>(index)
                .map_err(|e| map_pg_error(context, e))?
                .into(),
            ColumnKind::Text => row
                .try_get::<_, Option<String>>(index)
                .map_err(|e| map_pg_error(context, e))?
                .into(),
        };
        Ok(value)
    }
}

/// PostgreSQL implementation of [`DatabaseClient`]
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    async fn load_descriptors(&self, only: Option<&str>) -> Result<Vec<TableDescriptor>> {
        let client = self.client.get_connection().await?;
        let only = only.map(str::to_string);

        let column_rows = client
            .query(
                r#"
                SELECT c.table_name::text, c.column_name::text, c.udt_name::text
                FROM information_schema.columns c
                JOIN information_schema.tables t
                  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
                WHERE c.table_schema = current_schema()
                  AND t.table_type = 'BASE TABLE'
                  AND ($1::text IS NULL OR c.table_name = $1)
                ORDER BY c.table_name, c.ordinal_position
                "#,
                &[&only],
            )
            .await
            .map_err(|e| map_pg_error("Failed to list columns", e))?;

        let key_rows = client
            .query(
                r#"
                SELECT tc.table_name::text, kcu.column_name::text
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                  ON kcu.constraint_name = tc.constraint_name
                 AND kcu.table_schema = tc.table_schema
                 AND kcu.table_name = tc.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema = current_schema()
                  AND ($1::text IS NULL OR tc.table_name = $1)
                ORDER BY tc.table_name, kcu.ordinal_position
                "#,
                &[&only],
            )
            .await
            .map_err(|e| map_pg_error("Failed to list primary keys", e))?;

        let estimate_rows = client
            .query(
                r#"
                SELECT c.relname::text, GREATEST(c.reltuples, 0)::int8
                FROM pg_class c
                JOIN pg_namespace n ON n.oid = c.relnamespace
                WHERE n.nspname = current_schema() AND c.relkind IN ('r', 'p')
                  AND ($1::text IS NULL OR c.relname = $1)
                "#,
                &[&only],
            )
            .await
            .map_err(|e| map_pg_error("Failed to read row estimates", e))?;

        let mut tables: BTreeMap<String, TableDescriptor> = BTreeMap::new();
        for row in &column_rows {
            let table: String = row.get(0);
            tables
                .entry(table.clone())
                .or_insert_with(|| TableDescriptor::new(table, Vec::new(), Vec::new()))
                .columns
                .push(Column::new(row.get::<_, String>(1), row.get::<_, String>(2)));
        }
        for row in &key_rows {
            if let Some(table) = tables.get_mut(&row.get::<_, String>(0)) {
                table.primary_key.push(row.get(1));
            }
        }
        for row in &estimate_rows {
            if let Some(table) = tables.get_mut(&row.get::<_, String>(0)) {
                table.estimated_rows = row.get::<_, i64>(1).max(0) as u64;
            }
        }

        Ok(tables.into_values().collect())
    }

    async fn select(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        columns: Vec<String>,
        kinds: &[ColumnKind],
    ) -> Result<RowSet> {
        let client = self.client.get_connection().await?;
        let rows = client
            .query(sql, params)
            .await
            .map_err(|e| map_pg_error("Batch query failed", e))?;

        let mut set = RowSet::new(columns);
        for row in &rows {
            let values = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| kind.read(row, i))
                .collect::<Result<Vec<_>>>()?;
            set.push(values)?;
        }
        Ok(set)
    }

    async fn fetch_query(&self, query: &str) -> Result<RowSet> {
        let query = query.trim().trim_end_matches(';');
        let client = self.client.get_connection().await?;
        let statement = client
            .prepare(query)
            .await
            .map_err(|e| map_pg_error("Invalid custom query", e))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let kinds: Vec<ColumnKind> = statement
            .columns()
            .iter()
            .map(|c| ColumnKind::from_type(c.type_()))
            .collect();
        drop(client);

        let select_list = select_list(&columns, &kinds);
        let sql = format!("SELECT {select_list} FROM ({query}) AS tabport_q");
        self.select(&sql, &[], columns, &kinds).await
    }
}

fn kinds_of(table: &TableDescriptor) -> Vec<ColumnKind> {
    table
        .columns
        .iter()
        .map(|c| ColumnKind::from_udt(&c.data_type))
        .collect()
}

fn select_list(columns: &[String], kinds: &[ColumnKind]) -> String {
    columns
        .iter()
        .zip(kinds)
        .map(|(c, k)| k.select_expr(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ident_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Text form of a value for a `$n::text::type` parameter
fn param_text(value: &Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(format_float(*f)?),
        Value::Text(s) => Some(s.clone()),
    })
}

/// `$n::text::"type"` placeholders for a key tuple, starting at `first`
fn typed_placeholders(udts: &[&str], first: usize) -> String {
    udts.iter()
        .enumerate()
        .map(|(i, udt)| format!("${}::text::{}", first + i, quote_ident(udt)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn as_params(values: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn truncate_without_fk_sql(table: &str) -> String {
    format!(
        "SET LOCAL session_replication_role = replica; DELETE FROM {}",
        quote_ident(table)
    )
}

fn insert_sql(
    table: &TableDescriptor,
    columns: &[String],
    udts: &[&str],
    rows: usize,
    on_conflict: OnConflict,
) -> String {
    let width = columns.len();
    let tuples = (0..rows)
        .map(|r| format!("({})", typed_placeholders(udts, r * width + 1)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {tuples}",
        quote_ident(&table.name),
        ident_list(columns)
    );

    match on_conflict {
        OnConflict::Skip => sql.push_str(" ON CONFLICT DO NOTHING"),
        OnConflict::Replace if !table.primary_key.is_empty() => {
            let updates: Vec<String> = columns
                .iter()
                .filter(|c| !table.primary_key.contains(*c))
                .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
                .collect();
            if updates.is_empty() {
                sql.push_str(" ON CONFLICT DO NOTHING");
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    ident_list(&table.primary_key),
                    updates.join(", ")
                ));
            }
        }
        OnConflict::Replace | OnConflict::Fail => {}
    }
    sql
}

#[async_trait]
impl DatabaseClient for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn list_tables(&self) -> Result<Vec<TableDescriptor>> {
        self.load_descriptors(None).await
    }

    async fn describe_table(&self, name: &str) -> Result<Option<TableDescriptor>> {
        Ok(self.load_descriptors(Some(name)).await?.into_iter().next())
    }

    async fn count_rows(&self, table: &TableDescriptor, filter: Option<&str>) -> Result<u64> {
        let conditions: Vec<String> = filter.map(|f| format!("({f})")).into_iter().collect();
        let sql = format!(
            "SELECT count(*) FROM {}{}",
            quote_ident(&table.name),
            where_clause(&conditions)
        );

        let client = self.client.get_connection().await?;
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| map_pg_error("Failed to count rows", e))?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
    }

    async fn key_boundaries(
        &self,
        table: &TableDescriptor,
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let indices = table.primary_key_indices().ok_or_else(|| {
            TabportError::Configuration(format!("table '{}' has no usable primary key", table.name))
        })?;
        let kinds: Vec<ColumnKind> = indices
            .iter()
            .map(|&i| ColumnKind::from_udt(&table.columns[i].data_type))
            .collect();

        let keys = ident_list(&table.primary_key);
        let conditions: Vec<String> = filter.map(|f| format!("({f})")).into_iter().collect();
        let sql = format!(
            "SELECT {} FROM (SELECT {keys}, row_number() OVER (ORDER BY {keys}) AS tabport_rn \
             FROM {}{}) AS s WHERE (s.tabport_rn - 1) % $1 = 0 ORDER BY s.tabport_rn",
            select_list(&table.primary_key, &kinds),
            quote_ident(&table.name),
            where_clause(&conditions)
        );

        let step = batch_size.max(1) as i64;
        let set = self
            .select(&sql, &[&step], table.primary_key.clone(), &kinds)
            .await?;
        Ok(set.rows)
    }

    async fn fetch_rows(
        &self,
        table: &TableDescriptor,
        range: &RowRange,
        filter: Option<&str>,
    ) -> Result<RowSet> {
        let columns = table.column_names();
        let kinds = kinds_of(table);
        let mut conditions: Vec<String> = filter.map(|f| format!("({f})")).into_iter().collect();

        match range {
            RowRange::Key { lower, upper } => {
                let udts: Vec<&str> = table
                    .primary_key
                    .iter()
                    .map(|k| table.column(k).map_or("text", |c| c.data_type.as_str()))
                    .collect();
                let keys = ident_list(&table.primary_key);

                let mut values = lower.iter().map(param_text).collect::<Result<Vec<_>>>()?;
                conditions.push(format!("({keys}) >= ({})", typed_placeholders(&udts, 1)));
                if let Some(upper) = upper {
                    let first = values.len() + 1;
                    values.extend(upper.iter().map(param_text).collect::<Result<Vec<_>>>()?);
                    conditions.push(format!(
                        "({keys}) < ({})",
                        typed_placeholders(&udts, first)
                    ));
                }

                let sql = format!(
                    "SELECT {} FROM {}{} ORDER BY {keys}",
                    select_list(&columns, &kinds),
                    quote_ident(&table.name),
                    where_clause(&conditions)
                );
                self.select(&sql, &as_params(&values), columns, &kinds).await
            }
            RowRange::Offset { offset, limit } => {
                let order = (1..=columns.len())
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT {} FROM {}{} ORDER BY {order} LIMIT $1 OFFSET $2",
                    select_list(&columns, &kinds),
                    quote_ident(&table.name),
                    where_clause(&conditions)
                );
                let limit = *limit as i64;
                let offset = *offset as i64;
                self.select(&sql, &[&limit, &offset], columns, &kinds).await
            }
            RowRange::Query(query) => self.fetch_query(query).await,
            RowRange::File(name) => Err(TabportError::Configuration(format!(
                "cannot fetch file range '{name}' from a database"
            ))),
        }
    }

    async fn truncate_table(&self, table: &TableDescriptor, disable_fk: bool) -> Result<()> {
        let mut client = self.client.get_connection().await?;
        if !disable_fk {
            return client
                .batch_execute(&format!("TRUNCATE TABLE {}", quote_ident(&table.name)))
                .await
                .map_err(|e| map_pg_error("Failed to truncate table", e));
        }

        // TRUNCATE checks referencing tables regardless of triggers, DELETE
        // under the replica role does not
        let tx = client
            .transaction()
            .await
            .map_err(|e| map_pg_error("Failed to begin transaction", e))?;
        tx.batch_execute(&truncate_without_fk_sql(&table.name))
            .await
            .map_err(|e| map_pg_error("Failed to truncate table", e))?;
        tx.commit()
            .await
            .map_err(|e| map_pg_error("Failed to commit truncate", e))
    }

    async fn apply_rows(
        &self,
        table: &TableDescriptor,
        rows: &RowSet,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome> {
        if rows.is_empty() || rows.columns.is_empty() {
            return Ok(ApplyOutcome::default());
        }

        let udts = rows
            .columns
            .iter()
            .map(|name| {
                table.column(name).map(|c| c.data_type.as_str()).ok_or_else(|| {
                    TabportError::Database(format!(
                        "column \"{name}\" of relation \"{}\" does not exist",
                        table.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let max_rows = (MAX_PARAMS / rows.columns.len()).max(1);
        let chunk_size = options.chunk_size.clamp(1, max_rows);

        let mut client = self.client.get_connection().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| map_pg_error("Failed to begin transaction", e))?;

        if options.disable_fk {
            // Scoped to this transaction, reset on commit or rollback
            tx.batch_execute("SET LOCAL session_replication_role = replica")
                .await
                .map_err(|e| map_pg_error("Failed to disable foreign-key checks", e))?;
        }

        let mut outcome = ApplyOutcome::default();
        for chunk in rows.rows.chunks(chunk_size) {
            let sql = insert_sql(table, &rows.columns, &udts, chunk.len(), options.on_conflict);
            let values = chunk
                .iter()
                .flatten()
                .map(param_text)
                .collect::<Result<Vec<_>>>()?;

            let affected = tx
                .execute(&sql, &as_params(&values))
                .await
                .map_err(|e| map_pg_error("Failed to insert rows", e))?;

            outcome.inserted += affected;
            if options.on_conflict == OnConflict::Skip {
                outcome.skipped += chunk.len() as u64 - affected.min(chunk.len() as u64);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_pg_error("Failed to commit batch", e))?;
        Ok(outcome)
    }

    fn database_name(&self) -> &str {
        self.client.database_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn users() -> TableDescriptor {
        TableDescriptor::new(
            "users",
            vec![
                Column::new("id", "int4"),
                Column::new("name", "varchar"),
                Column::new("score", "float8"),
            ],
            vec!["id".to_string()],
        )
    }

    #[test_case("int8", ColumnKind::Int)]
    #[test_case("float4", ColumnKind::Float)]
    #[test_case("bool", ColumnKind::Bool)]
    #[test_case("numeric", ColumnKind::Text)]
    #[test_case("timestamptz", ColumnKind::Text)]
    fn test_column_kind(udt: &str, expected: ColumnKind) {
        assert_eq!(ColumnKind::from_udt(udt), expected);
    }

    #[test]
    fn test_insert_sql_skip() {
        let table = users();
        let columns = table.column_names();
        let sql = insert_sql(&table, &columns, &["int4", "varchar", "float8"], 2, OnConflict::Skip);
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"name\", \"score\") VALUES \
             ($1::text::\"int4\", $2::text::\"varchar\", $3::text::\"float8\"), \
             ($4::text::\"int4\", $5::text::\"varchar\", $6::text::\"float8\") \
             ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_insert_sql_replace_updates_non_key_columns() {
        let table = users();
        let columns = table.column_names();
        let sql = insert_sql(&table, &columns, &["int4", "varchar", "float8"], 1, OnConflict::Replace);
        assert!(sql.ends_with(
            "ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\", \"score\" = EXCLUDED.\"score\""
        ));

        let sql = insert_sql(&table, &columns, &["int4", "varchar", "float8"], 1, OnConflict::Fail);
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_truncate_without_fk_is_transaction_scoped_delete() {
        assert_eq!(
            truncate_without_fk_sql("users"),
            "SET LOCAL session_replication_role = replica; DELETE FROM \"users\""
        );
    }

    #[test]
    fn test_param_text() {
        assert_eq!(param_text(&Value::Null).unwrap(), None);
        assert_eq!(param_text(&Value::Float(2.0)).unwrap(), Some("2.0".to_string()));
        assert_eq!(param_text(&Value::Bool(true)).unwrap(), Some("true".to_string()));
        assert!(param_text(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_where_clause() {
        assert_eq!(where_clause(&[]), "");
        assert_eq!(
            where_clause(&["(a > 1)".to_string(), "b = 2".to_string()]),
            " WHERE (a > 1) AND b = 2"
        );
    }
}
