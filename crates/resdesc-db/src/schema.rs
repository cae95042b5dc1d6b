//! Provisioning of the `research_description` table.
//!
//! [`SchemaManager::ensure_schema`] creates the table when it is absent and
//! otherwise checks that the existing table has the expected columns, types
//! and keys. The `research` table is never created or modified here.

use std::fmt;
use std::time::Instant;

use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};

use resdesc_core::{Error, Result, SchemaStatus, MAX_TYPE_LEN};

/// Name of the managed table.
pub const TABLE_NAME: &str = "research_description";

/// Name of the referenced parent table.
pub const RESEARCH_TABLE: &str = "research";

/// Default PostgreSQL schema.
pub const DEFAULT_SCHEMA: &str = "public";

/// Schemas that must never hold application tables.
const RESERVED_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

/// A validated PostgreSQL schema name, safe to splice into SQL text.
///
/// Stored lowercased, matching how PostgreSQL folds unquoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate a schema name.
    ///
    /// Accepts 1-63 ASCII letters, digits and underscores, not starting with
    /// a digit and not naming a system schema.
    ///
    /// ```
    /// use resdesc_db::SchemaName;
    ///
    /// assert!(SchemaName::parse("field_2026").is_ok());
    /// assert!(SchemaName::parse("2026_field").is_err());
    /// assert!(SchemaName::parse("x; DROP TABLE research").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Schema name cannot be empty".to_string(),
            ));
        }

        // PostgreSQL truncates identifiers beyond NAMEDATALEN - 1.
        if name.len() > 63 {
            return Err(Error::InvalidInput(format!(
                "Schema name exceeds 63 character limit: {} characters",
                name.len()
            )));
        }

        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::InvalidInput(format!(
                "Schema name must start with a letter or underscore: '{}'",
                name
            )));
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
        {
            return Err(Error::InvalidInput(format!(
                "Schema name contains invalid character: '{}'",
                bad
            )));
        }

        let lowered = name.to_ascii_lowercase();
        if RESERVED_SCHEMAS.contains(&lowered.as_str()) || lowered.starts_with("pg_") {
            return Err(Error::InvalidInput(format!(
                "Schema name '{}' is reserved by PostgreSQL",
                name
            )));
        }

        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `schema.table`, for use in SQL text.
    pub fn qualify(&self, table: &str) -> String {
        format!("{}.{}", self.0, table)
    }
}

impl Default for SchemaName {
    fn default() -> Self {
        Self(DEFAULT_SCHEMA.to_string())
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SchemaName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    /// `column_default`, e.g. `nextval('..._id_seq'::regclass)` for SERIAL.
    pub default: Option<String>,
    /// `GENERATED ... AS IDENTITY`.
    pub identity: bool,
}

impl ColumnInfo {
    /// Whether PostgreSQL fills the column when an insert omits it.
    pub fn engine_assigned(&self) -> bool {
        self.identity
            || self
                .default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("))
    }
}

/// Key constraints found on an existing table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// `id` is the primary key.
    pub primary_key_on_id: bool,
    /// `ON DELETE` action code (`pg_constraint.confdeltype`) of the foreign
    /// key from `research_id` to `research (id)`; `None` when there is none.
    pub research_fk_on_delete: Option<char>,
}

/// Human-readable name of a `confdeltype` code.
fn delete_action_name(code: char) -> &'static str {
    match code {
        'a' => "NO ACTION",
        'r' => "RESTRICT",
        'c' => "CASCADE",
        'n' => "SET NULL",
        'd' => "SET DEFAULT",
        _ => "unknown",
    }
}

struct ExpectedColumn {
    name: &'static str,
    data_types: &'static [&'static str],
    max_length: Option<i32>,
    nullable: bool,
    engine_assigned: bool,
}

const EXPECTED_COLUMNS: &[ExpectedColumn] = &[
    ExpectedColumn {
        name: "id",
        data_types: &["integer"],
        max_length: None,
        nullable: false,
        engine_assigned: true,
    },
    ExpectedColumn {
        name: "research_id",
        data_types: &["integer"],
        max_length: None,
        nullable: false,
        engine_assigned: false,
    },
    ExpectedColumn {
        name: "type",
        data_types: &["character varying"],
        max_length: Some(MAX_TYPE_LEN as i32),
        nullable: false,
        engine_assigned: false,
    },
    ExpectedColumn {
        name: "polygon_data",
        data_types: &["jsonb", "json"],
        max_length: None,
        nullable: true,
        engine_assigned: false,
    },
    ExpectedColumn {
        name: "text",
        data_types: &["text"],
        max_length: None,
        nullable: true,
        engine_assigned: false,
    },
];

/// Compare an existing table against the expected shape.
///
/// Returns one message per mismatch; empty means compatible.
pub fn shape_mismatches(columns: &[ColumnInfo], keys: KeyInfo) -> Vec<String> {
    let mut problems = Vec::new();

    for expected in EXPECTED_COLUMNS {
        let Some(actual) = columns.iter().find(|c| c.name == expected.name) else {
            problems.push(format!("missing column '{}'", expected.name));
            continue;
        };

        if !expected.data_types.contains(&actual.data_type.as_str()) {
            problems.push(format!(
                "column '{}' has type '{}', expected {}",
                expected.name,
                actual.data_type,
                expected.data_types.join(" or ")
            ));
        } else if actual.max_length != expected.max_length {
            problems.push(format!(
                "column '{}' has length {:?}, expected {:?}",
                expected.name, actual.max_length, expected.max_length
            ));
        }

        if actual.nullable != expected.nullable {
            problems.push(format!(
                "column '{}' is {}, expected {}",
                expected.name,
                if actual.nullable { "nullable" } else { "NOT NULL" },
                if expected.nullable { "nullable" } else { "NOT NULL" }
            ));
        }

        if expected.engine_assigned && !actual.engine_assigned() {
            problems.push(format!(
                "column '{}' has no sequence default or identity, expected SERIAL",
                expected.name
            ));
        }
    }

    for column in columns {
        if !EXPECTED_COLUMNS.iter().any(|e| e.name == column.name) {
            problems.push(format!("unexpected column '{}'", column.name));
        }
    }

    if !keys.primary_key_on_id {
        problems.push("column 'id' is not the primary key".to_string());
    }
    match keys.research_fk_on_delete {
        None => problems.push(format!(
            "column 'research_id' has no foreign key to '{} (id)'",
            RESEARCH_TABLE
        )),
        Some('a') | Some('r') => {}
        Some(code) => problems.push(format!(
            "foreign key on 'research_id' uses ON DELETE {}, expected NO ACTION or RESTRICT",
            delete_action_name(code)
        )),
    }

    problems
}

/// DDL for the managed table.
pub fn create_table_sql(schema: &SchemaName) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id           SERIAL PRIMARY KEY,
            research_id  INTEGER NOT NULL REFERENCES {research} (id),
            "type"       VARCHAR({max_type}) NOT NULL,
            polygon_data JSONB,
            text         TEXT
        )
        "#,
        table = schema.qualify(TABLE_NAME),
        research = schema.qualify(RESEARCH_TABLE),
        max_type = MAX_TYPE_LEN,
    )
}

/// Creates and verifies the `research_description` table.
#[derive(Clone)]
pub struct SchemaManager {
    pool: Pool<Postgres>,
    schema: SchemaName,
}

impl SchemaManager {
    /// Create a manager for the default `public` schema.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_schema(pool, SchemaName::default())
    }

    /// Create a manager for a specific schema.
    pub fn with_schema(pool: Pool<Postgres>, schema: SchemaName) -> Self {
        Self { pool, schema }
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Make sure the table exists with the expected shape.
    ///
    /// Idempotent. Fails with [`Error::DependencyMissing`] when the
    /// `research` table is absent and [`Error::SchemaConflict`] when an
    /// existing `research_description` table has a different shape.
    pub async fn ensure_schema(&self) -> Result<SchemaStatus> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serialize concurrent provisioning of the same table.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(self.schema.qualify(TABLE_NAME))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        self.check_research_table(&mut tx).await?;

        let columns = self.columns(&mut tx).await?;
        let status = if columns.is_empty() {
            sqlx::query(&create_table_sql(&self.schema))
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            SchemaStatus::Created
        } else {
            let keys = self.keys(&mut tx).await?;
            let problems = shape_mismatches(&columns, keys);
            if !problems.is_empty() {
                warn!(
                    subsystem = "database",
                    component = "schema",
                    op = "ensure_schema",
                    db_schema = %self.schema,
                    problems = problems.len(),
                    "Existing table has an incompatible shape"
                );
                return Err(Error::SchemaConflict(format!(
                    "{}: {}",
                    self.schema.qualify(TABLE_NAME),
                    problems.join("; ")
                )));
            }
            SchemaStatus::AlreadyPresent
        };

        tx.commit().await.map_err(Error::Database)?;

        match status {
            SchemaStatus::Created => info!(
                subsystem = "database",
                component = "schema",
                op = "ensure_schema",
                db_schema = %self.schema,
                duration_ms = start.elapsed().as_millis() as u64,
                "Created research_description table"
            ),
            SchemaStatus::AlreadyPresent => debug!(
                subsystem = "database",
                component = "schema",
                op = "ensure_schema",
                db_schema = %self.schema,
                duration_ms = start.elapsed().as_millis() as u64,
                "research_description table already present"
            ),
        }
        Ok(status)
    }

    /// Whether the managed table currently exists.
    pub async fn table_exists(&self) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(self.schema.as_str())
        .bind(TABLE_NAME)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    /// Drop the managed table. Intended for test teardown.
    pub async fn drop_table(&self) -> Result<()> {
        sqlx::query(&format!(
            "DROP TABLE IF EXISTS {}",
            self.schema.qualify(TABLE_NAME)
        ))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn check_research_table(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                ) AS has_table,
                EXISTS (
                    SELECT 1 FROM information_schema.columns
                    WHERE table_schema = $1 AND table_name = $2 AND column_name = 'id'
                ) AS has_id,
                EXISTS (
                    SELECT 1
                    FROM pg_constraint c
                    JOIN pg_class t ON c.conrelid = t.oid
                    JOIN pg_namespace n ON t.relnamespace = n.oid
                    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = 'id'
                    WHERE c.contype IN ('p', 'u')
                        AND n.nspname = $1
                        AND t.relname = $2
                        AND c.conkey = ARRAY[a.attnum]
                ) AS has_unique_id
            "#,
        )
        .bind(self.schema.as_str())
        .bind(RESEARCH_TABLE)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let has_table: bool = row.try_get("has_table").map_err(Error::Database)?;
        let has_id: bool = row.try_get("has_id").map_err(Error::Database)?;
        let has_unique_id: bool = row.try_get("has_unique_id").map_err(Error::Database)?;

        if !has_table {
            return Err(Error::DependencyMissing(format!(
                "table {} does not exist",
                self.schema.qualify(RESEARCH_TABLE)
            )));
        }
        if !has_id {
            return Err(Error::DependencyMissing(format!(
                "table {} has no 'id' column",
                self.schema.qualify(RESEARCH_TABLE)
            )));
        }
        if !has_unique_id {
            return Err(Error::DependencyMissing(format!(
                "column {}.id is neither a primary key nor unique",
                self.schema.qualify(RESEARCH_TABLE)
            )));
        }
        Ok(())
    }

    async fn columns(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                column_name::text AS name,
                data_type::text AS data_type,
                character_maximum_length::int AS max_length,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                is_identity::text AS is_identity
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(self.schema.as_str())
        .bind(TABLE_NAME)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| -> std::result::Result<ColumnInfo, sqlx::Error> {
                let is_nullable: String = row.try_get("is_nullable")?;
                let is_identity: Option<String> = row.try_get("is_identity")?;
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    max_length: row.try_get("max_length")?,
                    nullable: is_nullable == "YES",
                    default: row.try_get("column_default")?,
                    identity: is_identity.as_deref() == Some("YES"),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Database)
    }

    async fn keys(&self, tx: &mut Transaction<'_, Postgres>) -> Result<KeyInfo> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (
                    SELECT 1
                    FROM pg_constraint c
                    JOIN pg_class src ON c.conrelid = src.oid
                    JOIN pg_namespace n ON src.relnamespace = n.oid
                    JOIN pg_attribute a
                        ON a.attrelid = c.conrelid AND a.attnum = ANY (c.conkey)
                    WHERE c.contype = 'p'
                        AND n.nspname = $1
                        AND src.relname = $2
                        AND a.attname = 'id'
                        AND array_length(c.conkey, 1) = 1
                ) AS primary_key_on_id,
                (
                    -- Prefer a non-cascading key when several qualify.
                    SELECT c.confdeltype::text
                    FROM pg_constraint c
                    JOIN pg_class src ON c.conrelid = src.oid
                    JOIN pg_namespace n ON src.relnamespace = n.oid
                    JOIN pg_class ref ON c.confrelid = ref.oid
                    JOIN pg_namespace rn ON ref.relnamespace = rn.oid
                    JOIN pg_attribute a
                        ON a.attrelid = c.conrelid AND a.attname = 'research_id'
                    JOIN pg_attribute ra
                        ON ra.attrelid = ref.oid AND ra.attname = 'id'
                    WHERE c.contype = 'f'
                        AND n.nspname = $1
                        AND src.relname = $2
                        AND rn.nspname = $1
                        AND ref.relname = $3
                        AND c.conkey = ARRAY[a.attnum]
                        AND c.confkey = ARRAY[ra.attnum]
                    ORDER BY c.confdeltype IN ('a', 'r') DESC
                    LIMIT 1
                ) AS research_fk_on_delete
            "#,
        )
        .bind(self.schema.as_str())
        .bind(TABLE_NAME)
        .bind(RESEARCH_TABLE)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(KeyInfo {
            primary_key_on_id: row.try_get("primary_key_on_id").map_err(Error::Database)?,
            research_fk_on_delete: row
                .try_get::<Option<String>, _>("research_fk_on_delete")
                .map_err(Error::Database)?
                .and_then(|code| code.chars().next()),
        })
    }
}
