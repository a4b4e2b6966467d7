use crate::books::repository::BookCollection;
use crate::catalog::domain::BookCatalogQueries;
use crate::catalog::domain::service::BookCatalogQueriesImpl;

pub fn create_catalog_queries(books: Box<dyn BookCollection>) -> Box<dyn BookCatalogQueries> {
    Box::new(BookCatalogQueriesImpl::new(books))
}
