//! Research description repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, warn};

use resdesc_core::{
    validate, validate_batch, Error, ListOrder, NewResearchDescription, ResearchDescription,
    ResearchDescriptionPatch, ResearchDescriptionRepository, Result, ValidationPolicy,
    ValidationReport,
};

use crate::schema::{SchemaName, TABLE_NAME};

const COLUMNS: &str = r#"id, research_id, "type", polygon_data, text"#;

/// SQL text for one schema, built once per repository.
#[derive(Debug, Clone)]
struct Statements {
    insert: String,
    select: String,
    select_for_update: String,
    list_unordered: String,
    list_ascending: String,
    list_descending: String,
    update: String,
    delete: String,
    count: String,
}

impl Statements {
    fn new(schema: &SchemaName) -> Self {
        let table = schema.qualify(TABLE_NAME);
        let list = format!("SELECT {COLUMNS} FROM {table} WHERE research_id = $1");
        Self {
            insert: format!(
                r#"INSERT INTO {table} (research_id, "type", polygon_data, text)
                   VALUES ($1, $2, $3, $4)
                   RETURNING {COLUMNS}"#
            ),
            select: format!("SELECT {COLUMNS} FROM {table} WHERE id = $1"),
            select_for_update: format!("SELECT {COLUMNS} FROM {table} WHERE id = $1 FOR UPDATE"),
            list_ascending: format!("{list} ORDER BY id ASC"),
            list_descending: format!("{list} ORDER BY id DESC"),
            list_unordered: list,
            update: format!(
                r#"UPDATE {table} SET "type" = $2, polygon_data = $3, text = $4
                   WHERE id = $1
                   RETURNING {COLUMNS}"#
            ),
            delete: format!("DELETE FROM {table} WHERE id = $1"),
            count: format!("SELECT COUNT(*) FROM {table} WHERE research_id = $1"),
        }
    }

    fn list(&self, order: Option<ListOrder>) -> &str {
        match order {
            None => &self.list_unordered,
            Some(ListOrder::IdAscending) => &self.list_ascending,
            Some(ListOrder::IdDescending) => &self.list_descending,
        }
    }
}

fn description_from_row(row: &PgRow) -> Result<ResearchDescription> {
    Ok(ResearchDescription {
        id: row.try_get("id").map_err(Error::Database)?,
        research_id: row.try_get("research_id").map_err(Error::Database)?,
        kind: row.try_get("type").map_err(Error::Database)?,
        polygon_data: row
            .try_get::<Option<JsonValue>, _>("polygon_data")
            .map_err(Error::Database)?,
        text: row.try_get("text").map_err(Error::Database)?,
    })
}

/// Translate engine errors raised by writes into the error taxonomy.
fn map_write_error(err: sqlx::Error, research_id: i32) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_foreign_key_violation() {
            return Error::ForeignKeyViolation { research_id };
        }
    }
    Error::Database(err)
}

/// PostgreSQL implementation of ResearchDescriptionRepository.
#[derive(Clone)]
pub struct PgResearchDescriptionRepository {
    pool: Pool<Postgres>,
    schema: SchemaName,
    policy: ValidationPolicy,
    sql: Statements,
}

impl PgResearchDescriptionRepository {
    /// Create a repository over `public.research_description` with the
    /// default validation policy.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_options(pool, SchemaName::default(), ValidationPolicy::default())
    }

    /// Create a repository for a specific schema and policy.
    pub fn with_options(pool: Pool<Postgres>, schema: SchemaName, policy: ValidationPolicy) -> Self {
        let sql = Statements::new(&schema);
        Self {
            pool,
            schema,
            policy,
            sql,
        }
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Run the validation layer without touching the database.
    pub fn validate(&self, req: &NewResearchDescription) -> ValidationReport {
        validate(req, &self.policy)
    }

    fn check(&self, report: ValidationReport, op: &str) -> Result<()> {
        if !report.is_valid() {
            warn!(
                subsystem = "database",
                component = "descriptions",
                op,
                violation_count = report.violations().len(),
                error = %report,
                "Rejected invalid research description"
            );
        }
        report.into_result()
    }
}

#[async_trait]
impl ResearchDescriptionRepository for PgResearchDescriptionRepository {
    async fn create(&self, req: NewResearchDescription) -> Result<ResearchDescription> {
        let start = Instant::now();
        self.check(self.validate(&req), "create")?;

        let research_id = req.research_id;
        let created = sqlx::query(&self.sql.insert)
            .bind(req.research_id)
            .bind(req.kind)
            .bind(req.polygon_data)
            .bind(req.text)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, research_id))
            .and_then(|row| description_from_row(&row))?;

        debug!(
            subsystem = "database",
            component = "descriptions",
            op = "create",
            description_id = created.id,
            research_id,
            kind = %created.kind,
            duration_ms = start.elapsed().as_millis() as u64,
            "Created research description"
        );
        Ok(created)
    }

    async fn create_batch(
        &self,
        reqs: Vec<NewResearchDescription>,
    ) -> Result<Vec<ResearchDescription>> {
        let start = Instant::now();
        self.check(validate_batch(&reqs, &self.policy), "create_batch")?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut created = Vec::with_capacity(reqs.len());
        for req in reqs {
            created.push(self.insert_tx(&mut tx, req).await?);
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "descriptions",
            op = "create_batch",
            result_count = created.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Created research descriptions"
        );
        Ok(created)
    }

    async fn get(&self, id: i32) -> Result<ResearchDescription> {
        let row = sqlx::query(&self.sql.select)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NotFound(id))?;

        description_from_row(&row)
    }

    fn list_by_research(
        &self,
        research_id: i32,
        order: Option<ListOrder>,
    ) -> BoxStream<'_, Result<ResearchDescription>> {
        sqlx::query(self.sql.list(order))
            .bind(research_id)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(Error::Database)
                    .and_then(|row| description_from_row(&row))
            })
            .boxed()
    }

    async fn update(
        &self,
        id: i32,
        patch: ResearchDescriptionPatch,
    ) -> Result<ResearchDescription> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&self.sql.select_for_update)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NotFound(id))?;
        let mut record = description_from_row(&row)?;

        if patch.is_empty() {
            tx.commit().await.map_err(Error::Database)?;
            return Ok(record);
        }

        record.apply(patch);
        self.check(self.validate(&record.as_new()), "update")?;

        let row = sqlx::query(&self.sql.update)
            .bind(id)
            .bind(&record.kind)
            .bind(&record.polygon_data)
            .bind(&record.text)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let updated = description_from_row(&row)?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "descriptions",
            op = "update",
            description_id = id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Updated research description"
        );
        Ok(updated)
    }

    async fn delete(&self, id: i32) -> Result<bool> {
        let result = sqlx::query(&self.sql.delete)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        let removed = result.rows_affected() > 0;
        debug!(
            subsystem = "database",
            component = "descriptions",
            op = "delete",
            description_id = id,
            removed,
            "Deleted research description"
        );
        Ok(removed)
    }

    async fn count_by_research(&self, research_id: i32) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(&self.sql.count)
            .bind(research_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

/// Transaction-aware variants for callers composing larger units of work.
impl PgResearchDescriptionRepository {
    /// Insert a description within an existing transaction.
    ///
    /// Validates with the repository policy first. A foreign key failure
    /// aborts the surrounding transaction, as PostgreSQL always does.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: NewResearchDescription,
    ) -> Result<ResearchDescription> {
        self.check(self.validate(&req), "create_tx")?;
        self.insert_tx(tx, req).await
    }

    /// Fetch a description within an existing transaction.
    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i32,
    ) -> Result<ResearchDescription> {
        let row = sqlx::query(&self.sql.select)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NotFound(id))?;

        description_from_row(&row)
    }

    async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        req: NewResearchDescription,
    ) -> Result<ResearchDescription> {
        let research_id = req.research_id;
        let row = sqlx::query(&self.sql.insert)
            .bind(req.research_id)
            .bind(req.kind)
            .bind(req.polygon_data)
            .bind(req.text)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_write_error(e, research_id))?;

        description_from_row(&row)
    }
}
