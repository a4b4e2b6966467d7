use futures::TryStreamExt;
use serde::Serialize;

use crate::books::domain::model::{Book, BookProjection};
use crate::catalog::domain::BookCatalogQueries;
use crate::catalog::domain::service::author_year_index_spec;
use crate::core::domain::DemoOptions;
use crate::core::library::CatalogResult;

const PAGE: u64 = 1;
const BOOKS_PER_PAGE: u64 = 5;

// DemoStep records how many records one step of the walkthrough returned or touched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoStep {
    pub name: &'static str,
    pub records: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemoReport {
    pub steps: Vec<DemoStep>,
}

impl DemoReport {
    fn record(&mut self, name: &'static str, records: usize) {
        tracing::info!(step = name, records, "step complete");
        self.steps.push(DemoStep { name, records });
    }

    pub fn records(&self, name: &str) -> Option<usize> {
        self.steps.iter().find(|s| s.name == name).map(|s| s.records)
    }
}

/// Runs the bookstore walkthrough: basic CRUD, advanced queries, aggregation
/// pipelines and indexing. The first error stops the sequence and is returned
/// to the caller.
pub async fn run_queries(queries: &dyn BookCatalogQueries, options: &DemoOptions) -> CatalogResult<DemoReport> {
    let mut report = DemoReport::default();

    tracing::info!("task 2: basic CRUD operations");
    let books: Vec<Book> = queries.find_by_genre("Gothic Fiction").await?.try_collect().await?;
    log_books("books in the Gothic Fiction genre", &books)?;
    report.record("find_by_genre", books.len());

    let books: Vec<Book> = queries.find_published_after(1847).await?.try_collect().await?;
    log_books("books published after 1847", &books)?;
    report.record("find_published_after", books.len());

    let books: Vec<Book> = queries.find_by_author("J.R.R. Tolkien").await?.try_collect().await?;
    log_books("books by J.R.R. Tolkien", &books)?;
    report.record("find_by_author", books.len());

    if options.run_mutations {
        match options.price_update_id.as_deref() {
            Some(id) => {
                let outcome = queries.update_price(id, options.new_price).await?;
                tracing::info!(book_id = id, price = options.new_price, modified = outcome.count(), "price updated");
                report.record("update_price", outcome.count() as usize);
            }
            None => tracing::info!("no BOOKSTORE_PRICE_UPDATE_ID set, skipping price update"),
        }
        let outcome = queries.delete_by_title("The Great Gatsby").await?;
        tracing::info!(deleted = outcome.count(), "deleted The Great Gatsby");
        report.record("delete_by_title", outcome.count() as usize);
    } else {
        tracing::info!("mutations disabled, skipping price update and delete");
    }

    tracing::info!("task 3: advanced queries");
    let books: Vec<Book> = queries.find_in_stock_after(2010).await?.try_collect().await?;
    log_books("books in stock and published after 2010", &books)?;
    report.record("find_in_stock_after", books.len());

    let rows: Vec<BookProjection> = queries.find_projected(2010, &["title", "author", "price"]).await?
        .try_collect().await?;
    tracing::info!(records = rows.len(), books = %serde_json::to_string(&rows)?,
        "title, author and price of books in stock published before 2010");
    report.record("find_projected", rows.len());

    let books: Vec<Book> = queries.sort_by_price(true).await?.try_collect().await?;
    log_books("books by ascending price", &books)?;
    report.record("sort_by_price_asc", books.len());

    let books: Vec<Book> = queries.sort_by_price(false).await?.try_collect().await?;
    log_books("books by descending price", &books)?;
    report.record("sort_by_price_desc", books.len());

    let books: Vec<Book> = queries.paginate(PAGE, BOOKS_PER_PAGE).await?.try_collect().await?;
    log_books(format!("books on page {}", PAGE).as_str(), &books)?;
    report.record("paginate", books.len());

    tracing::info!("task 4: aggregation pipeline");
    let averages = queries.average_price_by_genre().await?;
    tracing::info!(averages = %serde_json::to_string(&averages)?, "average price of books by genre");
    report.record("average_price_by_genre", averages.len());

    let top = queries.author_with_most_books().await?;
    tracing::info!(author = %serde_json::to_string(&top)?, "author with the most books");
    report.record("author_with_most_books", top.iter().count());

    let decades = queries.books_by_decade().await?;
    tracing::info!(decades = %serde_json::to_string(&decades)?, "books by publication decade");
    report.record("books_by_decade", decades.len());

    tracing::info!("task 5: indexing");
    let name = queries.ensure_title_index().await?;
    tracing::info!(index = %name, "indexed title field");
    report.record("ensure_title_index", 1);

    let name = queries.ensure_author_year_index().await?;
    tracing::info!(index = %name, "compound index on author and published_year");
    report.record("ensure_author_year_index", 1);

    let with_index = queries.explain_query("Paulo Coelho", 1988).await?;
    tracing::info!(stats = %serde_json::to_string(&with_index)?, "execution stats with the compound index");
    report.record("explain_with_index", with_index.docs_examined as usize);

    let dropped = queries.drop_index_if_exists(author_year_index_spec().name().as_str()).await?;
    tracing::info!(dropped, "dropped the compound index, rerunning the same query");

    let without_index = queries.explain_query("Paulo Coelho", 1988).await?;
    tracing::info!(stats = %serde_json::to_string(&without_index)?, "execution stats without the compound index");
    report.record("explain_without_index", without_index.docs_examined as usize);

    Ok(report)
}

fn log_books(message: &str, books: &[Book]) -> CatalogResult<()> {
    tracing::info!(records = books.len(), books = %serde_json::to_string(books)?, "{}", message);
    Ok(())
}
