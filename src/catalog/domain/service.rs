use std::collections::BTreeMap;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{self, Document};
use serde::de::DeserializeOwned;

use crate::books::domain::model::{AuthorCount, Book, BookId, BookProjection, ExecutionStats};
use crate::books::domain::query::{Accumulator, BookFilter, BookUpdate, Condition, GroupKey, IndexSpec, Pipeline, QueryOptions, Stage, GROUP_VALUE_FIELD};
use crate::books::repository::BookCollection;
use crate::catalog::domain::BookCatalogQueries;
use crate::core::library::{BookField, CatalogError, CatalogResult, SortOrder};
use crate::core::repository::{DocumentStream, EntityStream, MutationOutcome};
use crate::utils::mongo::{bson_count, bson_number};

const PROJECTABLE_FIELDS: [BookField; 3] = [BookField::Title, BookField::Author, BookField::Price];

pub fn title_index_spec() -> IndexSpec {
    IndexSpec::ascending(&[BookField::Title])
}

pub fn author_year_index_spec() -> IndexSpec {
    IndexSpec::ascending(&[BookField::Author, BookField::PublishedYear])
}

pub struct BookCatalogQueriesImpl {
    books: Box<dyn BookCollection>,
}

impl BookCatalogQueriesImpl {
    pub fn new(books: Box<dyn BookCollection>) -> Self {
        Self {
            books,
        }
    }

    async fn find_books(&self, filter: BookFilter, options: QueryOptions) -> CatalogResult<EntityStream<Book>> {
        let docs = self.books.find(&filter, &options).await?;
        Ok(decode_stream(docs))
    }

    async fn aggregate_rows(&self, pipeline: Pipeline) -> CatalogResult<Vec<Document>> {
        let docs = self.books.aggregate(&pipeline).await?;
        docs.try_collect().await
    }
}

#[async_trait]
impl BookCatalogQueries for BookCatalogQueriesImpl {
    async fn find_by_genre(&self, genre: &str) -> CatalogResult<EntityStream<Book>> {
        let genre = require_text("genre", genre)?;
        self.find_books(BookFilter::with(Condition::Genre(genre)), QueryOptions::default()).await
    }

    async fn find_published_after(&self, year: i32) -> CatalogResult<EntityStream<Book>> {
        self.find_books(BookFilter::with(Condition::PublishedAfter(year)), QueryOptions::default()).await
    }

    async fn find_by_author(&self, author: &str) -> CatalogResult<EntityStream<Book>> {
        let author = require_text("author", author)?;
        self.find_books(BookFilter::with(Condition::Author(author)), QueryOptions::default()).await
    }

    async fn update_price(&self, id: &str, new_price: f64) -> CatalogResult<MutationOutcome> {
        let book_id = BookId::parse(id)?;
        if !new_price.is_finite() || new_price < 0.0 {
            return Err(CatalogError::validation(
                format!("price must be a non-negative amount, got {}", new_price).as_str(),
                Some("InvalidPrice".to_string())));
        }
        let outcome = self.books.update_one(
            &BookFilter::with(Condition::Id(book_id)), &BookUpdate::SetPrice(new_price)).await?;
        if !outcome.found() {
            tracing::warn!(book_id = %book_id, "no book to update");
        }
        Ok(outcome)
    }

    async fn delete_by_title(&self, title: &str) -> CatalogResult<MutationOutcome> {
        let title = require_text("title", title)?;
        let outcome = self.books.delete_one(&BookFilter::with(Condition::Title(title.to_string()))).await?;
        if !outcome.found() {
            tracing::warn!(title = %title, "no book to delete");
        }
        Ok(outcome)
    }

    async fn find_in_stock_after(&self, year: i32) -> CatalogResult<EntityStream<Book>> {
        let filter = BookFilter::with(Condition::InStock(true))
            .and(Condition::PublishedAfter(year));
        self.find_books(filter, QueryOptions::default()).await
    }

    async fn find_projected(&self, year_bound: i32, fields: &[&str]) -> CatalogResult<EntityStream<BookProjection>> {
        let mut projection: Vec<BookField> = Vec::new();
        for name in fields {
            let field = BookField::parse(name)?;
            if !PROJECTABLE_FIELDS.contains(&field) {
                return Err(CatalogError::validation(
                    format!("field {} cannot be projected, expected title, author or price", field).as_str(),
                    Some("UnsupportedProjection".to_string())));
            }
            if !projection.contains(&field) {
                projection.push(field);
            }
        }
        if projection.is_empty() {
            return Err(CatalogError::validation("projection needs at least one field", Some("EmptyProjection".to_string())));
        }
        let filter = BookFilter::with(Condition::InStock(true))
            .and(Condition::PublishedBefore(year_bound));
        let options = QueryOptions { projection: Some(projection), ..QueryOptions::default() };
        let docs = self.books.find(&filter, &options).await?;
        Ok(decode_stream(docs))
    }

    async fn sort_by_price(&self, ascending: bool) -> CatalogResult<EntityStream<Book>> {
        let options = QueryOptions::sorted(BookField::Price, SortOrder::from_ascending(ascending));
        self.find_books(BookFilter::all(), options).await
    }

    async fn paginate(&self, page: u64, page_size: u64) -> CatalogResult<EntityStream<Book>> {
        if page < 1 || page_size < 1 {
            return Err(CatalogError::validation(
                format!("page {} and page size {} must both be at least 1", page, page_size).as_str(),
                Some("InvalidPage".to_string())));
        }
        let skip = (page - 1).checked_mul(page_size).ok_or_else(|| CatalogError::validation(
            format!("page {} of size {} is out of range", page, page_size).as_str(), Some("InvalidPage".to_string())))?;
        let limit = i64::try_from(page_size).map_err(|_| CatalogError::validation(
            format!("page size {} is out of range", page_size).as_str(), Some("InvalidPage".to_string())))?;
        // _id order follows insertion so consecutive pages neither overlap nor skip
        let mut options = QueryOptions::sorted(BookField::Id, SortOrder::Ascending);
        options.skip = Some(skip);
        options.limit = Some(limit);
        self.find_books(BookFilter::all(), options).await
    }

    async fn count_books(&self) -> CatalogResult<u64> {
        self.books.count(&BookFilter::all()).await
    }

    async fn average_price_by_genre(&self) -> CatalogResult<BTreeMap<String, f64>> {
        let rows = self.aggregate_rows(Pipeline::new()
            .then(Stage::Group { key: GroupKey::Field(BookField::Genre), accumulator: Accumulator::Average(BookField::Price) })
        ).await?;
        let mut averages = BTreeMap::new();
        for row in rows {
            let genre = row.get_str("_id").map_err(|err| CatalogError::serialization(
                format!("genre group without a genre: {}", err).as_str()))?;
            let average = group_value(&row, bson_number)?;
            averages.insert(genre.to_string(), average);
        }
        Ok(averages)
    }

    async fn author_with_most_books(&self) -> CatalogResult<Option<AuthorCount>> {
        let rows = self.aggregate_rows(Pipeline::new()
            .then(Stage::Group { key: GroupKey::Field(BookField::Author), accumulator: Accumulator::Count })
            .then(Stage::SortByValue(SortOrder::Descending))
            .then(Stage::Limit(1))
        ).await?;
        match rows.first() {
            Some(row) => {
                let author = row.get_str("_id").map_err(|err| CatalogError::serialization(
                    format!("author group without an author: {}", err).as_str()))?;
                Ok(Some(AuthorCount {
                    author: author.to_string(),
                    book_count: group_value(row, bson_count)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn books_by_decade(&self) -> CatalogResult<BTreeMap<i32, u64>> {
        let rows = self.aggregate_rows(Pipeline::new()
            .then(Stage::Group { key: GroupKey::Decade, accumulator: Accumulator::Count })
        ).await?;
        let mut decades = BTreeMap::new();
        for row in rows {
            let decade = row.get("_id").and_then(bson_number).ok_or_else(|| CatalogError::serialization(
                format!("decade group without a numeric decade: {}", row).as_str()))?;
            decades.insert(decade as i32, group_value(&row, bson_count)?);
        }
        Ok(decades)
    }

    async fn ensure_title_index(&self) -> CatalogResult<String> {
        self.books.create_index(&title_index_spec()).await
    }

    async fn ensure_author_year_index(&self) -> CatalogResult<String> {
        self.books.create_index(&author_year_index_spec()).await
    }

    async fn drop_index(&self, name: &str) -> CatalogResult<()> {
        let name = require_text("index name", name)?;
        self.books.drop_index(name.as_str()).await
    }

    async fn drop_index_if_exists(&self, name: &str) -> CatalogResult<bool> {
        match self.drop_index(name).await {
            Ok(()) => Ok(true),
            Err(CatalogError::IndexNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list_indexes(&self) -> CatalogResult<Vec<String>> {
        self.books.list_index_names().await
    }

    async fn explain_query(&self, author: &str, year: i32) -> CatalogResult<ExecutionStats> {
        let author = require_text("author", author)?;
        let filter = BookFilter::with(Condition::Author(author))
            .and(Condition::PublishedIn(year));
        self.books.explain(&filter).await
    }
}

fn require_text(name: &str, value: &str) -> CatalogResult<String> {
    if value.trim().is_empty() {
        return Err(CatalogError::validation(
            format!("{} must not be empty", name).as_str(), Some("EmptyValue".to_string())));
    }
    Ok(value.to_string())
}

fn group_value<T>(row: &Document, read: fn(&bson::Bson) -> Option<T>) -> CatalogResult<T> {
    row.get(GROUP_VALUE_FIELD).and_then(read).ok_or_else(|| CatalogError::serialization(
        format!("group row without a numeric value: {}", row).as_str()))
}

fn decode_stream<T: DeserializeOwned + Send + 'static>(docs: DocumentStream) -> EntityStream<T> {
    docs.map(|res| res.and_then(|doc| bson::from_document::<T>(doc).map_err(CatalogError::from)))
        .boxed()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use futures::TryStreamExt;

    use crate::books::domain::model::{AuthorCount, Book, BookProjection};
    use crate::books::repository::memory_book_collection::MemoryBookCollection;
    use crate::catalog::domain::BookCatalogQueries;
    use crate::catalog::domain::service::BookCatalogQueriesImpl;
    use crate::core::library::CatalogError;

    fn sut(books: Vec<Book>) -> (BookCatalogQueriesImpl, MemoryBookCollection) {
        let collection = MemoryBookCollection::new(books);
        (BookCatalogQueriesImpl::new(Box::new(collection.clone())), collection)
    }

    fn catalog() -> Vec<Book> {
        vec![
            Book::new("Wuthering Heights", "Emily Bronte", "Gothic Fiction", 1847, 8.99, true),
            Book::new("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.99, true),
            Book::new("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1954, 19.99, true),
            Book::new("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 9.99, false),
            Book::new("The Alchemist", "Paulo Coelho", "Fiction", 1988, 10.99, true),
            Book::new("Dracula", "Bram Stoker", "Gothic Fiction", 1897, 12.5, false),
            Book::new("The Martian", "Andy Weir", "Sci-Fi", 2011, 15.0, true),
        ]
    }

    async fn titles(stream: crate::core::repository::EntityStream<Book>) -> Vec<String> {
        let books: Vec<Book> = stream.try_collect().await.expect("should stream books");
        books.into_iter().map(|b| b.title).collect()
    }

    #[tokio::test]
    async fn test_should_find_only_matching_genre() {
        let (svc, _) = sut(catalog());
        let books: Vec<Book> = svc.find_by_genre("Gothic Fiction").await.expect("should find")
            .try_collect().await.expect("should stream");
        assert_eq!(2, books.len());
        assert!(books.iter().all(|b| b.genre == "Gothic Fiction"));

        let none: Vec<Book> = svc.find_by_genre("gothic fiction").await.expect("should find")
            .try_collect().await.expect("should stream");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_should_find_published_after_year() {
        let (svc, _) = sut(catalog());
        for year in [1847, 1900, 1988, 2011] {
            let books: Vec<Book> = svc.find_published_after(year).await.expect("should find")
                .try_collect().await.expect("should stream");
            assert!(books.iter().all(|b| b.published_year > year));
            assert_eq!(catalog().iter().filter(|b| b.published_year > year).count(), books.len());
        }
    }

    #[tokio::test]
    async fn test_should_restart_finds_per_call() {
        let (svc, _) = sut(catalog());
        let first = titles(svc.find_by_author("J.R.R. Tolkien").await.expect("should find")).await;
        let second = titles(svc.find_by_author("J.R.R. Tolkien").await.expect("should find")).await;
        assert_eq!(vec!["The Hobbit".to_string(), "The Lord of the Rings".to_string()], first);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_should_reject_empty_text_before_request() {
        let (svc, collection) = sut(catalog());
        assert!(svc.find_by_genre("").await.err().expect("should fail").is_validation());
        assert!(svc.find_by_author("  ").await.err().expect("should fail").is_validation());
        assert!(svc.delete_by_title("").await.expect_err("should fail").is_validation());
        assert!(svc.explain_query("", 1988).await.expect_err("should fail").is_validation());
        assert_eq!(0, collection.requests_issued());
    }

    #[tokio::test]
    async fn test_should_update_price() {
        let books = catalog();
        let target = books[4].clone();
        let (svc, collection) = sut(books);
        let outcome = svc.update_price(target.id.to_string().as_str(), 20.99).await.expect("should update");
        assert_eq!(1, outcome.count());
        let stored = collection.books().await.into_iter().find(|b| b.id == target.id).expect("should keep book");
        assert_eq!(20.99, stored.price);
    }

    #[tokio::test]
    async fn test_should_reject_invalid_price_before_request() {
        let books = catalog();
        let id = books[0].id.to_string();
        let (svc, collection) = sut(books);
        assert!(svc.update_price(id.as_str(), -1.0).await.expect_err("should fail").is_validation());
        assert!(svc.update_price(id.as_str(), f64::NAN).await.expect_err("should fail").is_validation());
        assert!(svc.update_price("68dea3c4", 5.0).await.expect_err("should fail").is_validation());
        assert_eq!(0, collection.requests_issued());
        assert_eq!(8.99, collection.books().await[0].price);
    }

    #[tokio::test]
    async fn test_should_report_missing_book_on_update() {
        let (svc, _) = sut(catalog());
        let outcome = svc.update_price("68dea3c4b513760d7d5eee97", 20.99).await.expect("should not fail");
        assert_eq!(0, outcome.count());
        assert!(matches!(outcome.require_found("book"), Err(CatalogError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_should_delete_one_by_title() {
        let mut books = catalog();
        books.push(Book::new("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 11.0, true));
        let (svc, collection) = sut(books);
        assert_eq!(1, svc.delete_by_title("The Great Gatsby").await.expect("should delete").count());
        assert_eq!(1, svc.delete_by_title("The Great Gatsby").await.expect("should delete").count());
        assert_eq!(0, svc.delete_by_title("The Great Gatsby").await.expect("should delete").count());
        assert_eq!(6, collection.books().await.len());
    }

    #[tokio::test]
    async fn test_should_find_in_stock_after_year() {
        let (svc, _) = sut(catalog());
        let found = titles(svc.find_in_stock_after(1900).await.expect("should find")).await;
        assert_eq!(vec!["The Hobbit", "The Lord of the Rings", "The Alchemist", "The Martian"], found);
    }

    #[tokio::test]
    async fn test_should_project_requested_fields() {
        let (svc, _) = sut(catalog());
        let rows: Vec<BookProjection> = svc.find_projected(2010, &["title", "price", "title"]).await.expect("should find")
            .try_collect().await.expect("should stream");
        assert_eq!(4, rows.len());
        assert!(rows.iter().all(|r| r.title.is_some() && r.price.is_some() && r.author.is_none()));
        assert_eq!(Some("Wuthering Heights".to_string()), rows[0].title);
    }

    #[tokio::test]
    async fn test_should_reject_invalid_projection() {
        let (svc, collection) = sut(catalog());
        assert!(svc.find_projected(2010, &["genre"]).await.err().expect("should fail").is_validation());
        assert!(svc.find_projected(2010, &["isbn"]).await.err().expect("should fail").is_validation());
        assert!(svc.find_projected(2010, &[]).await.err().expect("should fail").is_validation());
        assert_eq!(0, collection.requests_issued());
    }

    #[tokio::test]
    async fn test_should_sort_by_price() {
        let (svc, _) = sut(catalog());
        let asc: Vec<Book> = svc.sort_by_price(true).await.expect("should sort").try_collect().await.expect("should stream");
        assert!(asc.windows(2).all(|w| w[0].price <= w[1].price));
        let desc: Vec<Book> = svc.sort_by_price(false).await.expect("should sort").try_collect().await.expect("should stream");
        assert!(desc.windows(2).all(|w| w[0].price >= w[1].price));
        assert_eq!("The Lord of the Rings", desc[0].title);
    }

    #[tokio::test]
    async fn test_should_partition_pages() {
        let books = catalog();
        let expected: Vec<String> = books.iter().map(|b| b.title.to_string()).collect();
        let (svc, _) = sut(books);
        let mut seen = Vec::new();
        for page in 1..=4 {
            let titles = titles(svc.paginate(page, 2).await.expect("should paginate")).await;
            assert!(titles.len() <= 2);
            seen.extend(titles);
        }
        assert_eq!(expected, seen);
        assert_eq!(7, svc.count_books().await.expect("should count"));
    }

    #[tokio::test]
    async fn test_should_reject_invalid_pages() {
        let (svc, collection) = sut(catalog());
        assert!(svc.paginate(0, 5).await.err().expect("should fail").is_validation());
        assert!(svc.paginate(1, 0).await.err().expect("should fail").is_validation());
        assert!(svc.paginate(u64::MAX, 5).await.err().expect("should fail").is_validation());
        assert!(svc.paginate(1, u64::MAX).await.err().expect("should fail").is_validation());
        assert_eq!(0, collection.requests_issued());
    }

    #[tokio::test]
    async fn test_should_average_price_by_genre() {
        let (svc, _) = sut(vec![
            Book::new("a", "x", "Gothic Fiction", 1900, 10.0, true),
            Book::new("b", "y", "Gothic Fiction", 1901, 20.0, true),
            Book::new("c", "z", "Sci-Fi", 1902, 5.0, true),
        ]);
        let averages = svc.average_price_by_genre().await.expect("should aggregate");
        assert_eq!(BTreeMap::from([("Gothic Fiction".to_string(), 15.0), ("Sci-Fi".to_string(), 5.0)]), averages);
    }

    #[tokio::test]
    async fn test_should_find_author_with_most_books() {
        let (svc, _) = sut(catalog());
        let top = svc.author_with_most_books().await.expect("should aggregate");
        assert_eq!(Some(AuthorCount { author: "J.R.R. Tolkien".to_string(), book_count: 2 }), top);

        let (tied, _) = sut(vec![
            Book::new("a", "Zadie Smith", "Fiction", 2000, 1.0, true),
            Book::new("b", "Ann Patchett", "Fiction", 2001, 1.0, true),
        ]);
        let top = tied.author_with_most_books().await.expect("should aggregate").expect("should have author");
        assert_eq!("Ann Patchett", top.author);

        let (empty, _) = sut(vec![]);
        assert_eq!(None, empty.author_with_most_books().await.expect("should aggregate"));
    }

    #[tokio::test]
    async fn test_should_count_books_by_decade() {
        let (svc, _) = sut(vec![
            Book::new("a", "x", "Fiction", 1985, 1.0, true),
            Book::new("b", "y", "Fiction", 1989, 1.0, true),
            Book::new("c", "z", "Fiction", 1991, 1.0, true),
        ]);
        let decades = svc.books_by_decade().await.expect("should aggregate");
        assert_eq!(BTreeMap::from([(1980, 2), (1990, 1)]), decades);
    }

    #[tokio::test]
    async fn test_should_ensure_indexes_idempotently() {
        let (svc, _) = sut(catalog());
        assert_eq!("title_1", svc.ensure_title_index().await.expect("should create"));
        assert_eq!("title_1", svc.ensure_title_index().await.expect("should be a no-op"));
        assert_eq!("author_1_published_year_1", svc.ensure_author_year_index().await.expect("should create"));
        assert_eq!(3, svc.list_indexes().await.expect("should list").len());
    }

    #[tokio::test]
    async fn test_should_surface_missing_index_on_drop() {
        let (svc, _) = sut(catalog());
        let err = svc.drop_index("author_1_published_year_1").await.expect_err("should fail");
        assert!(matches!(err, CatalogError::IndexNotFound { .. }));
        assert_eq!(false, svc.drop_index_if_exists("author_1_published_year_1").await.expect("should not fail"));

        let name = svc.ensure_author_year_index().await.expect("should create");
        assert_eq!(true, svc.drop_index_if_exists(name.as_str()).await.expect("should drop"));
    }

    #[tokio::test]
    async fn test_should_explain_without_mutating() {
        let (svc, collection) = sut(catalog());
        let before = collection.books().await;
        let scan = svc.explain_query("Paulo Coelho", 1988).await.expect("should explain");
        assert_eq!(7, scan.docs_examined);
        assert_eq!(1, scan.docs_returned);

        svc.ensure_author_year_index().await.expect("should create");
        let indexed = svc.explain_query("Paulo Coelho", 1988).await.expect("should explain");
        assert_eq!(1, indexed.docs_examined);
        assert!(indexed.used_index());
        assert_eq!(before, collection.books().await);
    }

    #[tokio::test]
    async fn test_should_surface_connection_errors() {
        let (svc, collection) = sut(catalog());
        collection.set_offline(true);
        assert!(svc.find_by_genre("Fantasy").await.err().expect("should fail").is_connection());
        assert!(svc.average_price_by_genre().await.expect_err("should fail").is_connection());
        assert!(svc.ensure_title_index().await.expect_err("should fail").is_connection());
        let err = svc.drop_index_if_exists("title_1").await.expect_err("should fail");
        assert!(err.is_connection());
        // one request per call, nothing retried
        assert_eq!(4, collection.requests_issued());
    }
}
