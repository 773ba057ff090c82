//! MariaDB adapter implementing the database trait
//!
//! Everything runs as prepared statements so integers and floats come back
//! typed. Binary columns travel as hex text (`HEX` on read, `UNHEX` on
//! write) and every other non-numeric column as its `CHAR` rendering.

use crate::adapters::database::traits::{ApplyOptions, ApplyOutcome, DatabaseClient, OnConflict};
use crate::adapters::mariadb::client::{map_mysql_error, MariaDBClient};
use crate::domain::{Column, Result, RowRange, RowSet, TableDescriptor, TabportError, Value};
use async_trait::async_trait;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Params, Row, TxOpts, Value as SqlValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Placeholders allowed in one prepared statement
const MAX_PARAMS: usize = 65_535;

/// `binary` collation id, shared by BLOB and VARBINARY columns
const BINARY_CHARSET: u16 = 63;

/// How a column is read back from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Binary,
    Text,
}

impl ColumnKind {
    /// Kind from `information_schema.COLUMNS.COLUMN_TYPE`, e.g. `int(11) unsigned`
    fn from_column_type(column_type: &str) -> Self {
        let column_type = column_type.to_ascii_lowercase();
        if column_type.starts_with("tinyint(1)") || column_type == "boolean" {
            return ColumnKind::Bool;
        }
        let base = column_type
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or_default();
        match base {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                ColumnKind::Int
            }
            "float" | "double" | "real" => ColumnKind::Float,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                ColumnKind::Binary
            }
            _ => ColumnKind::Text,
        }
    }

    /// Kind from result-set metadata of a prepared custom query
    fn from_metadata(column_type: ColumnType, length: u32, charset: u16) -> Self {
        match column_type {
            ColumnType::MYSQL_TYPE_TINY if length == 1 => ColumnKind::Bool,
            ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR => ColumnKind::Int,
            ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => ColumnKind::Float,
            ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
                if charset == BINARY_CHARSET =>
            {
                ColumnKind::Binary
            }
            _ => ColumnKind::Text,
        }
    }

    fn select_expr(&self, column: &str) -> String {
        let ident = quote_ident(column);
        match self {
            ColumnKind::Int | ColumnKind::Float | ColumnKind::Bool => ident,
            ColumnKind::Binary => format!("HEX({ident})"),
            ColumnKind::Text => format!("CAST({ident} AS CHAR)"),
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            ColumnKind::Binary => "UNHEX(?)",
            _ => "?",
        }
    }

    fn read(&self, value: &SqlValue) -> Result<Value> {
        let invalid = || TabportError::Serialization(format!("cannot read {value:?} as {self:?}"));
        Ok(match (self, value) {
            (_, SqlValue::NULL) => Value::Null,
            (ColumnKind::Int, SqlValue::Int(i)) => Value::Int(*i),
            (ColumnKind::Int, SqlValue::UInt(u)) => {
                Value::Int(i64::try_from(*u).map_err(|_| invalid())?)
            }
            (ColumnKind::Float, SqlValue::Float(f)) => Value::Float(f64::from(*f)),
            (ColumnKind::Float, SqlValue::Double(d)) => Value::Float(*d),
            (ColumnKind::Float, SqlValue::Int(i)) => Value::Float(*i as f64),
            (ColumnKind::Bool, SqlValue::Int(i)) => Value::Bool(*i != 0),
            (ColumnKind::Bool, SqlValue::UInt(u)) => Value::Bool(*u != 0),
            (_, SqlValue::Bytes(bytes)) => {
                let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
                match self {
                    ColumnKind::Int => Value::Int(text.parse().map_err(|_| invalid())?),
                    ColumnKind::Float => Value::Float(text.parse().map_err(|_| invalid())?),
                    ColumnKind::Bool => Value::Bool(text != "0"),
                    ColumnKind::Binary | ColumnKind::Text => Value::Text(text.to_string()),
                }
            }
            _ => return Err(invalid()),
        })
    }
}

/// Bind value for a parameter
fn param(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::NULL,
        Value::Bool(b) => SqlValue::Int(i64::from(*b)),
        Value::Int(i) => SqlValue::Int(*i),
        Value::Float(f) if f.is_finite() => SqlValue::Double(*f),
        Value::Float(f) => {
            return Err(TabportError::Serialization(format!(
                "cannot bind non-finite float {f}"
            )))
        }
        Value::Text(s) => SqlValue::Bytes(s.as_bytes().to_vec()),
    })
}

fn params<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Params> {
    let values = values.into_iter().map(param).collect::<Result<Vec<_>>>()?;
    Ok(if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values)
    })
}

/// Quote an identifier with backticks
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn ident_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_list(columns: &[String], kinds: &[ColumnKind]) -> String {
    columns
        .iter()
        .zip(kinds)
        .map(|(c, k)| k.select_expr(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(kinds: &[ColumnKind]) -> String {
    kinds
        .iter()
        .map(ColumnKind::placeholder)
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

fn kind_of(table: &TableDescriptor, column: &str) -> ColumnKind {
    table
        .column(column)
        .map_or(ColumnKind::Text, |c| ColumnKind::from_column_type(&c.data_type))
}

fn insert_sql(
    table: &TableDescriptor,
    columns: &[String],
    kinds: &[ColumnKind],
    rows: usize,
    on_conflict: OnConflict,
) -> String {
    let tuple = format!("({})", placeholders(kinds));
    let tuples = vec![tuple; rows].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {tuples}",
        quote_ident(&table.name),
        ident_list(columns)
    );

    // A self-assignment leaves duplicates untouched and reports 0 affected rows
    let keep_existing = columns
        .first()
        .map(|c| format!(" ON DUPLICATE KEY UPDATE {0} = {0}", quote_ident(c)))
        .unwrap_or_default();

    match on_conflict {
        OnConflict::Skip => sql.push_str(&keep_existing),
        OnConflict::Replace => {
            let updates: Vec<String> = columns
                .iter()
                .filter(|c| !table.primary_key.contains(*c))
                .map(|c| format!("{0} = VALUES({0})", quote_ident(c)))
                .collect();
            if updates.is_empty() {
                sql.push_str(&keep_existing);
            } else {
                sql.push_str(" ON DUPLICATE KEY UPDATE ");
                sql.push_str(&updates.join(", "));
            }
        }
        OnConflict::Fail => {}
    }
    sql
}

async fn set_foreign_key_checks(conn: &mut Conn, enabled: bool) -> Result<()> {
    conn.query_drop(format!("SET FOREIGN_KEY_CHECKS = {}", u8::from(enabled)))
        .await
        .map_err(|e| map_mysql_error("Failed to set foreign-key checks", e))
}

/// Re-enable foreign-key checks before the connection goes back to the pool
///
/// A connection that cannot be restored is closed instead of reused.
async fn restore_foreign_key_checks(mut conn: Conn) {
    if let Err(e) = set_foreign_key_checks(&mut conn, true).await {
        tracing::warn!(error = %e, "Discarding connection with foreign-key checks off");
        if let Err(e) = conn.disconnect().await {
            tracing::debug!(error = %e, "Disconnect failed");
        }
    }
}

/// MariaDB implementation of [`DatabaseClient`]
pub struct MariaDBAdapter {
    client: Arc<MariaDBClient>,
}

impl MariaDBAdapter {
    pub fn new(client: MariaDBClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &Arc<MariaDBClient> {
        &self.client
    }

    async fn load_descriptors(&self, only: Option<&str>) -> Result<Vec<TableDescriptor>> {
        let mut conn = self.client.get_connection().await?;
        let only = only.map(str::to_string);

        let column_rows: Vec<(String, String, String)> = conn
            .exec(
                r#"
                SELECT c.TABLE_NAME, c.COLUMN_NAME, c.COLUMN_TYPE
                FROM information_schema.COLUMNS c
                JOIN information_schema.TABLES t
                  ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
                WHERE c.TABLE_SCHEMA = DATABASE()
                  AND t.TABLE_TYPE = 'BASE TABLE'
                  AND (? IS NULL OR c.TABLE_NAME = ?)
                ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
                "#,
                (only.clone(), only.clone()),
            )
            .await
            .map_err(|e| map_mysql_error("Failed to list columns", e))?;

        let key_rows: Vec<(String, String)> = conn
            .exec(
                r#"
                SELECT TABLE_NAME, COLUMN_NAME
                FROM information_schema.KEY_COLUMN_USAGE
                WHERE TABLE_SCHEMA = DATABASE()
                  AND CONSTRAINT_NAME = 'PRIMARY'
                  AND (? IS NULL OR TABLE_NAME = ?)
                ORDER BY TABLE_NAME, ORDINAL_POSITION
                "#,
                (only.clone(), only.clone()),
            )
            .await
            .map_err(|e| map_mysql_error("Failed to list primary keys", e))?;

        let estimate_rows: Vec<(String, u64)> = conn
            .exec(
                r#"
                SELECT TABLE_NAME, COALESCE(TABLE_ROWS, 0)
                FROM information_schema.TABLES
                WHERE TABLE_SCHEMA = DATABASE()
                  AND TABLE_TYPE = 'BASE TABLE'
                  AND (? IS NULL OR TABLE_NAME = ?)
                "#,
                (only.clone(), only),
            )
            .await
            .map_err(|e| map_mysql_error("Failed to read row estimates", e))?;

        let mut tables: BTreeMap<String, TableDescriptor> = BTreeMap::new();
        for (table, column, column_type) in column_rows {
            tables
                .entry(table.clone())
                .or_insert_with(|| TableDescriptor::new(table, Vec::new(), Vec::new()))
                .columns
                .push(Column::new(column, column_type));
        }
        for (table, column) in key_rows {
            if let Some(table) = tables.get_mut(&table) {
                table.primary_key.push(column);
            }
        }
        for (table, rows) in estimate_rows {
            if let Some(table) = tables.get_mut(&table) {
                table.estimated_rows = rows;
            }
        }

        Ok(tables.into_values().collect())
    }

    async fn select(
        &self,
        sql: &str,
        params: Params,
        columns: Vec<String>,
        kinds: &[ColumnKind],
    ) -> Result<RowSet> {
        let mut conn = self.client.get_connection().await?;
        let rows: Vec<Row> = conn
            .exec(sql, params)
            .await
            .map_err(|e| map_mysql_error("Batch query failed", e))?;

        let mut set = RowSet::new(columns);
        for row in &rows {
            let values = kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| match row.as_ref(i) {
                    Some(value) => kind.read(value),
                    None => Err(TabportError::Database(format!(
                        "result row has no column {i}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            set.push(values)?;
        }
        Ok(set)
    }

    async fn fetch_query(&self, query: &str) -> Result<RowSet> {
        let query = query.trim().trim_end_matches(';');
        let mut conn = self.client.get_connection().await?;
        let statement = conn
            .prep(query)
            .await
            .map_err(|e| map_mysql_error("Invalid custom query", e))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        let kinds: Vec<ColumnKind> = statement
            .columns()
            .iter()
            .map(|c| ColumnKind::from_metadata(c.column_type(), c.column_length(), c.character_set()))
            .collect();
        drop(conn);

        let sql = format!(
            "SELECT {} FROM ({query}) AS tabport_q",
            select_list(&columns, &kinds)
        );
        self.select(&sql, Params::Empty, columns, &kinds).await
    }

    async fn write_chunks(
        conn: &mut Conn,
        table: &TableDescriptor,
        rows: &RowSet,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome> {
        let kinds: Vec<ColumnKind> = rows.columns.iter().map(|c| kind_of(table, c)).collect();
        let max_rows = (MAX_PARAMS / rows.columns.len()).max(1);
        let chunk_size = options.chunk_size.clamp(1, max_rows);

        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| map_mysql_error("Failed to begin transaction", e))?;

        let mut outcome = ApplyOutcome::default();
        for chunk in rows.rows.chunks(chunk_size) {
            let sql = insert_sql(table, &rows.columns, &kinds, chunk.len(), options.on_conflict);
            tx.exec_drop(sql.as_str(), params(chunk.iter().flatten())?)
                .await
                .map_err(|e| map_mysql_error("Failed to insert rows", e))?;

            let written = chunk.len() as u64;
            match options.on_conflict {
                OnConflict::Skip => {
                    let inserted = tx.affected_rows().min(written);
                    outcome.inserted += inserted;
                    outcome.skipped += written - inserted;
                }
                // Updated rows count twice in affected_rows
                OnConflict::Replace | OnConflict::Fail => outcome.inserted += written,
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_mysql_error("Failed to commit batch", e))?;
        Ok(outcome)
    }
}

#[async_trait]
impl DatabaseClient for MariaDBAdapter {
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
            "SELECT COUNT(*) FROM {}{}",
            quote_ident(&table.name),
            where_clause(&conditions)
        );

        let mut conn = self.client.get_connection().await?;
        let count: Option<i64> = conn
            .exec_first(sql.as_str(), ())
            .await
            .map_err(|e| map_mysql_error("Failed to count rows", e))?;
        Ok(count.unwrap_or_default().max(0) as u64)
    }

    async fn key_boundaries(
        &self,
        table: &TableDescriptor,
        filter: Option<&str>,
        batch_size: usize,
    ) -> Result<Vec<Vec<Value>>> {
        if table.primary_key_indices().is_none() {
            return Err(TabportError::Configuration(format!(
                "table '{}' has no usable primary key",
                table.name
            )));
        }
        let kinds: Vec<ColumnKind> = table
            .primary_key
            .iter()
            .map(|k| kind_of(table, k))
            .collect();

        let keys = ident_list(&table.primary_key);
        let conditions: Vec<String> = filter.map(|f| format!("({f})")).into_iter().collect();
        let sql = format!(
            "SELECT {} FROM (SELECT {keys}, ROW_NUMBER() OVER (ORDER BY {keys}) AS tabport_rn \
             FROM {}{}) AS s WHERE MOD(s.tabport_rn - 1, ?) = 0 ORDER BY s.tabport_rn",
            select_list(&table.primary_key, &kinds),
            quote_ident(&table.name),
            where_clause(&conditions)
        );

        let step = batch_size.max(1) as i64;
        let set = self
            .select(
                &sql,
                Params::Positional(vec![SqlValue::Int(step)]),
                table.primary_key.clone(),
                &kinds,
            )
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
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| kind_of(table, c)).collect();
        let mut conditions: Vec<String> = filter.map(|f| format!("({f})")).into_iter().collect();

        match range {
            RowRange::Key { lower, upper } => {
                let key_kinds: Vec<ColumnKind> = table
                    .primary_key
                    .iter()
                    .map(|k| kind_of(table, k))
                    .collect();
                let keys = ident_list(&table.primary_key);

                conditions.push(format!("({keys}) >= ({})", placeholders(&key_kinds)));
                let mut bound: Vec<&Value> = lower.iter().collect();
                if let Some(upper) = upper {
                    conditions.push(format!("({keys}) < ({})", placeholders(&key_kinds)));
                    bound.extend(upper.iter());
                }

                let sql = format!(
                    "SELECT {} FROM {}{} ORDER BY {keys}",
                    select_list(&columns, &kinds),
                    quote_ident(&table.name),
                    where_clause(&conditions)
                );
                self.select(&sql, params(bound)?, columns, &kinds).await
            }
            RowRange::Offset { offset, limit } => {
                let order = (1..=columns.len())
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT {} FROM {}{} ORDER BY {order} LIMIT ? OFFSET ?",
                    select_list(&columns, &kinds),
                    quote_ident(&table.name),
                    where_clause(&conditions)
                );
                let bound = Params::Positional(vec![
                    SqlValue::Int(*limit as i64),
                    SqlValue::Int(*offset as i64),
                ]);
                self.select(&sql, bound, columns, &kinds).await
            }
            RowRange::Query(query) => self.fetch_query(query).await,
            RowRange::File(name) => Err(TabportError::Configuration(format!(
                "cannot fetch file range '{name}' from a database"
            ))),
        }
    }

    async fn truncate_table(&self, table: &TableDescriptor, disable_fk: bool) -> Result<()> {
        let mut conn = self.client.get_connection().await?;
        let sql = format!("TRUNCATE TABLE {}", quote_ident(&table.name));
        if !disable_fk {
            return conn
                .query_drop(sql)
                .await
                .map_err(|e| map_mysql_error("Failed to truncate table", e));
        }

        set_foreign_key_checks(&mut conn, false).await?;
        let result = conn
            .query_drop(sql)
            .await
            .map_err(|e| map_mysql_error("Failed to truncate table", e));
        restore_foreign_key_checks(conn).await;
        result
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
        if let Some(name) = rows.columns.iter().find(|c| table.column(c).is_none()) {
            return Err(TabportError::Database(format!(
                "Unknown column '{name}' in table '{}'",
                table.name
            )));
        }

        let mut conn = self.client.get_connection().await?;
        if !options.disable_fk {
            return Self::write_chunks(&mut conn, table, rows, options).await;
        }

        // FOREIGN_KEY_CHECKS is a session variable, not transaction scoped
        set_foreign_key_checks(&mut conn, false).await?;
        let result = Self::write_chunks(&mut conn, table, rows, options).await;
        restore_foreign_key_checks(conn).await;
        result
    }

    fn database_name(&self) -> &str {
        self.client.database_name()
    }
}
