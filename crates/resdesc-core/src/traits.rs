//! Core traits for research description storage.
//!
//! The PostgreSQL implementation lives in `resdesc-db`; the trait keeps
//! callers independent of it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::error::Result;
use crate::models::*;

/// Repository for research description CRUD operations.
#[async_trait]
pub trait ResearchDescriptionRepository: Send + Sync {
    /// Validate and insert a description, returning it with its new id.
    async fn create(&self, req: NewResearchDescription) -> Result<ResearchDescription>;

    /// Validate and insert several descriptions in a single transaction.
    async fn create_batch(
        &self,
        reqs: Vec<NewResearchDescription>,
    ) -> Result<Vec<ResearchDescription>>;

    /// Fetch a description by id.
    async fn get(&self, id: i32) -> Result<ResearchDescription>;

    /// Stream the descriptions of one research.
    ///
    /// Nothing is queried until the stream is polled. Each call runs a new
    /// query, so calling again restarts the listing.
    fn list_by_research(
        &self,
        research_id: i32,
        order: Option<ListOrder>,
    ) -> BoxStream<'_, Result<ResearchDescription>>;

    /// Replace the fields present in the patch.
    async fn update(&self, id: i32, patch: ResearchDescriptionPatch)
        -> Result<ResearchDescription>;

    /// Delete a description. Returns whether a row was removed; deleting a
    /// missing id is not an error.
    async fn delete(&self, id: i32) -> Result<bool>;

    /// Number of descriptions attached to a research.
    async fn count_by_research(&self, research_id: i32) -> Result<i64>;

    /// Drain [`list_by_research`](Self::list_by_research) into a vector.
    async fn collect_by_research(
        &self,
        research_id: i32,
        order: Option<ListOrder>,
    ) -> Result<Vec<ResearchDescription>> {
        self.list_by_research(research_id, order).try_collect().await
    }
}
