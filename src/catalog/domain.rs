pub mod service;

use std::collections::BTreeMap;
use async_trait::async_trait;
use crate::books::domain::model::{AuthorCount, Book, BookProjection, ExecutionStats};
use crate::core::library::CatalogResult;
use crate::core::repository::{EntityStream, MutationOutcome};

// BookCatalogQueries exposes the catalog queries with typed, validated inputs.
// Invalid input fails with a Validation error before any request is issued.
#[async_trait]
pub trait BookCatalogQueries: Sync + Send {
    async fn find_by_genre(&self, genre: &str) -> CatalogResult<EntityStream<Book>>;

    // published_year > year
    async fn find_published_after(&self, year: i32) -> CatalogResult<EntityStream<Book>>;

    async fn find_by_author(&self, author: &str) -> CatalogResult<EntityStream<Book>>;

    // an id that resolves to nothing is reported through the outcome, not as an error
    async fn update_price(&self, id: &str, new_price: f64) -> CatalogResult<MutationOutcome>;

    // removes one book with the title; which one is up to the store when titles repeat
    async fn delete_by_title(&self, title: &str) -> CatalogResult<MutationOutcome>;

    // in_stock and published_year > year
    async fn find_in_stock_after(&self, year: i32) -> CatalogResult<EntityStream<Book>>;

    // in_stock and published_year < year_bound, returning only the requested
    // fields out of title, author and price
    async fn find_projected(&self, year_bound: i32, fields: &[&str]) -> CatalogResult<EntityStream<BookProjection>>;

    // books with equal prices come back in no particular order
    async fn sort_by_price(&self, ascending: bool) -> CatalogResult<EntityStream<Book>>;

    // pages start at 1 and follow insertion order
    async fn paginate(&self, page: u64, page_size: u64) -> CatalogResult<EntityStream<Book>>;

    async fn count_books(&self) -> CatalogResult<u64>;

    async fn average_price_by_genre(&self) -> CatalogResult<BTreeMap<String, f64>>;

    // ties go to the author name that sorts first; None when there are no books
    async fn author_with_most_books(&self) -> CatalogResult<Option<AuthorCount>>;

    async fn books_by_decade(&self) -> CatalogResult<BTreeMap<i32, u64>>;

    async fn ensure_title_index(&self) -> CatalogResult<String>;

    async fn ensure_author_year_index(&self) -> CatalogResult<String>;

    async fn drop_index(&self, name: &str) -> CatalogResult<()>;

    // Ok(false) when the index did not exist
    async fn drop_index_if_exists(&self, name: &str) -> CatalogResult<bool>;

    async fn list_indexes(&self) -> CatalogResult<Vec<String>>;

    async fn explain_query(&self, author: &str, year: i32) -> CatalogResult<ExecutionStats>;
}
