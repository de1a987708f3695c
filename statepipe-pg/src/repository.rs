//! PostgreSQL state repository.
//!
//! Rows are selected as JSON objects and ingested through
//! [`StateRecord::from_raw_row`], the same path every extraction source
//! uses. Writes bind plain text parameters.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde::Serialize;
use serde_json::Value;
use statepipe_core::{
    serialize_document, IdentityFilter, NotFoundError, PersistedPayload, StateId, StateRecord,
    StateResult, ValidationError,
};
use statepipe_storage::StateRepository;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::config::{DbConfig, TableLayout};
use crate::error::PgError;
use crate::sql;

/// Column metadata reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    pub data_type: String,
}

/// State repository over a deadpool connection pool.
#[derive(Clone)]
pub struct PgStateRepository {
    pool: Pool,
    layout: TableLayout,
}

impl PgStateRepository {
    pub fn new(pool: Pool, layout: TableLayout) -> Self {
        Self { pool, layout }
    }

    /// Create the pool and repository from configuration.
    pub fn from_config(config: &DbConfig) -> StateResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config.layout.clone()))
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> StateResult<deadpool_postgres::Object> {
        Ok(self.pool.get().await.map_err(PgError::from)?)
    }

    fn ingest(&self, operation: &'static str, row: &Row) -> StateResult<StateRecord> {
        let value: Value = row.try_get(0).map_err(PgError::query(operation))?;
        match value {
            Value::Object(raw) => Ok(StateRecord::from_raw_row(&raw, self.layout.shape)?),
            other => Err(PgError::Decode {
                operation,
                reason: format!("expected a JSON object, got {other}"),
            }
            .into()),
        }
    }

    /// List columns of the states table whose names start with `prefix`.
    ///
    /// Pipeline loaders add bookkeeping columns such as `_dlt_id`; this
    /// reports them without altering the table.
    pub async fn list_columns(&self, prefix: &str) -> StateResult<Vec<ColumnInfo>> {
        let conn = self.get_conn().await?;
        let pattern = sql::prefix_pattern(prefix);
        let rows = conn
            .query(
                sql::LIST_COLUMNS,
                &[&self.layout.schema.as_str(), &self.layout.table.as_str(), &pattern],
            )
            .await
            .map_err(PgError::query("list_columns"))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let is_nullable: String = row.try_get(1)?;
                let data_type: String = row.try_get(2)?;
                Ok(ColumnInfo {
                    name,
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    data_type,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(|e| PgError::query("list_columns")(e).into())
    }
}

fn parse_payload_id(payload: &PersistedPayload) -> Result<StateId, ValidationError> {
    uuid::Uuid::parse_str(&payload.state_id).map_err(|e| ValidationError::InvalidStateId {
        value: payload.state_id.clone(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl StateRepository for PgStateRepository {
    async fn fetch(&self, filter: &IdentityFilter, limit: usize) -> StateResult<Vec<StateRecord>> {
        let statement = sql::fetch_statement(&self.layout, filter, limit);
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect();

        let conn = self.get_conn().await?;
        let rows = conn
            .query(statement.sql.as_str(), &params)
            .await
            .map_err(PgError::query("fetch"))?;

        tracing::debug!(
            table = %self.layout.qualified_table(),
            rows = rows.len(),
            limit,
            "Fetched state rows"
        );
        rows.iter().map(|row| self.ingest("fetch", row)).collect()
    }

    async fn get(&self, state_id: StateId) -> StateResult<Option<StateRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(sql::get_statement(&self.layout).as_str(), &[&state_id.to_string()])
            .await
            .map_err(PgError::query("get"))?;
        row.map(|row| self.ingest("get", &row)).transpose()
    }

    async fn update_document(&self, payload: &PersistedPayload) -> StateResult<()> {
        let state_id = parse_payload_id(payload)?;
        let conn = self.get_conn().await?;
        let affected = conn
            .execute(
                sql::update_document_statement(&self.layout).as_str(),
                &[&payload.document, &payload.state_id],
            )
            .await
            .map_err(PgError::query("update_document"))?;

        if affected == 0 {
            return Err(NotFoundError { state_id }.into());
        }
        tracing::debug!(%state_id, "Updated document");
        Ok(())
    }

    async fn upsert(&self, record: &StateRecord) -> StateResult<()> {
        let state_id = record.state_id().ok_or(ValidationError::MissingStateId)?;
        let document = serialize_document(record.document());
        let created_at = record.created_at().map(|ts| ts.to_rfc3339());
        let updated_at = record.updated_at().map(|ts| ts.to_rfc3339());

        let conn = self.get_conn().await?;
        conn.execute(
            sql::upsert_statement(&self.layout).as_str(),
            &[&state_id.to_string(), &document, &created_at, &updated_at],
        )
        .await
        .map_err(PgError::query("upsert"))?;

        tracing::debug!(%state_id, "Upserted record");
        Ok(())
    }
}
