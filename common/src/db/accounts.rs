// Customer account lookup for the enrichment job

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::table::Table;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};
use tracing::{info, instrument};

/// Source of customer account rows keyed by account number
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Fetch the accounts whose key is in `ids`
    ///
    /// The returned table may have no headers when nothing matched.
    async fn find_accounts(&self, ids: &[String]) -> Result<Table, DatabaseError>;
}

/// PostgreSQL-backed account directory
///
/// The query must bind the id list as `$1` (a `text[]`), e.g.
/// `SELECT ... FROM new_crm_account WHERE accountnumber = ANY($1)`.
pub struct PgAccountDirectory {
    pool: DbPool,
    query: String,
}

impl PgAccountDirectory {
    pub fn new(pool: DbPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
        }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn find_accounts(&self, ids: &[String]) -> Result<Table, DatabaseError> {
        if ids.is_empty() {
            return Ok(Table::default());
        }

        let rows = sqlx::query(&self.query)
            .bind(ids.to_vec())
            .fetch_all(self.pool.pool())
            .await?;

        let table = rows_to_table(&rows);
        info!(rows = table.len(), "Account query returned rows");
        Ok(table)
    }
}

fn rows_to_table(rows: &[PgRow]) -> Table {
    let Some(first) = rows.first() else {
        return Table::default();
    };

    let headers = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let mut table = Table::new(headers);

    for row in rows {
        let values = (0..row.columns().len())
            .map(|i| column_value(row, i))
            .collect();
        table.push_row(values);
    }
    table
}

fn column_value(row: &PgRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<String, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i32, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i64, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<i16, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<f64, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<f32, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<bool, _>(i) {
        json!(v)
    } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(i) {
        json!(v.to_string())
    } else if let Ok(v) = row.try_get::<chrono::DateTime<Utc>, _>(i) {
        json!(v.to_rfc3339())
    } else {
        // NULLs and types we don't map
        row.try_get::<Option<String>, _>(i)
            .ok()
            .flatten()
            .map(|s| json!(s))
            .unwrap_or(Value::Null)
    }
}
