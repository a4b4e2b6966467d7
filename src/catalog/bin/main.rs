use bookstore::books::factory::create_book_collection;
use bookstore::catalog::demo::run_queries;
use bookstore::catalog::factory::create_catalog_queries;
use bookstore::core::domain::Configuration;
use bookstore::core::library::CatalogError;
use bookstore::utils::mongo::{setup_tracing, MongoSession};

#[tokio::main]
async fn main() -> Result<(), CatalogError> {
    setup_tracing();

    let config = Configuration::from_env()?;
    let session = MongoSession::connect(&config).await.map_err(|err| {
        tracing::error!(error = %err, "failed to connect to mongodb");
        err
    })?;

    let queries = create_catalog_queries(create_book_collection(&session));
    let res = run_queries(queries.as_ref(), &config.demo).await;
    if let Err(ref err) = res {
        tracing::error!(error = %err, retryable = err.retryable(), "error during mongodb operations");
    }

    // released on success and on failure
    drop(queries);
    session.close().await;
    res.map(|report| {
        tracing::info!(steps = report.steps.len(), "walkthrough complete");
    })
}
