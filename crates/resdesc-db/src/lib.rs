//! # resdesc-db
//!
//! PostgreSQL data-access layer for research descriptions.
//!
//! This crate provides:
//! - Connection pool management
//! - Provisioning and verification of the `research_description` table
//! - A repository for description CRUD and per-research listings
//!
//! ## Example
//!
//! ```rust,ignore
//! use resdesc_db::{Database, NewResearchDescription, ResearchDescriptionRepository};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/research").await?;
//!     db.ensure_schema().await?;
//!
//!     let created = db
//!         .descriptions
//!         .create(NewResearchDescription::polygon(
//!             42,
//!             json!({"coordinates": [[0, 0], [1, 1]]}),
//!         ))
//!         .await?;
//!
//!     println!("Created description: {}", created.id);
//!     Ok(())
//! }
//! ```
pub mod descriptions;
pub mod pool;
pub mod schema;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use resdesc_core::*;

pub use descriptions::PgResearchDescriptionRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use schema::{SchemaManager, SchemaName};

/// Combined database context: the schema manager and the repository,
/// sharing one pool and one target schema.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Table provisioning.
    pub schema: SchemaManager,
    /// Research description repository.
    pub descriptions: PgResearchDescriptionRepository,
}

impl Database {
    /// Create a new Database instance over the `public` schema.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self::with_options(pool, SchemaName::default(), ValidationPolicy::default())
    }

    /// Create a Database instance for a specific schema and validation policy.
    pub fn with_options(
        pool: sqlx::Pool<sqlx::Postgres>,
        schema: SchemaName,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            schema: SchemaManager::with_schema(pool.clone(), schema.clone()),
            descriptions: PgResearchDescriptionRepository::with_options(
                pool.clone(),
                schema,
                policy,
            ),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Create or verify the `research_description` table.
    pub async fn ensure_schema(&self) -> Result<SchemaStatus> {
        self.schema.ensure_schema().await
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
