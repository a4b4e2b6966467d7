pub mod memory_book_collection;
pub mod mongo_book_collection;

use async_trait::async_trait;
use crate::books::domain::model::ExecutionStats;
use crate::books::domain::query::{BookFilter, BookUpdate, IndexSpec, Pipeline, QueryOptions};
use crate::core::library::CatalogResult;
use crate::core::repository::{DocumentStream, MutationOutcome};

// BookCollection is the handle over one collection of book documents. Every
// method issues exactly one request to the store and never retries.
#[async_trait]
pub trait BookCollection: Sync + Send {
    // filter-find returning a lazy stream of matching documents
    async fn find(&self, filter: &BookFilter, options: &QueryOptions) -> CatalogResult<DocumentStream>;

    async fn count(&self, filter: &BookFilter) -> CatalogResult<u64>;

    // updates the first document matching the filter
    async fn update_one(&self, filter: &BookFilter, update: &BookUpdate) -> CatalogResult<MutationOutcome>;

    // deletes the first document matching the filter
    async fn delete_one(&self, filter: &BookFilter) -> CatalogResult<MutationOutcome>;

    async fn aggregate(&self, pipeline: &Pipeline) -> CatalogResult<DocumentStream>;

    // creates the index if it does not exist yet and returns its name
    async fn create_index(&self, spec: &IndexSpec) -> CatalogResult<String>;

    // fails with IndexNotFound when no index has that name
    async fn drop_index(&self, name: &str) -> CatalogResult<()>;

    async fn list_index_names(&self) -> CatalogResult<Vec<String>>;

    // execution statistics of a find, without running side effects
    async fn explain(&self, filter: &BookFilter) -> CatalogResult<ExecutionStats>;
}
