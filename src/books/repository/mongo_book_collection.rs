use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::books::domain::model::ExecutionStats;
use crate::books::domain::query::{BookFilter, BookUpdate, IndexSpec, Pipeline, QueryOptions};
use crate::books::repository::BookCollection;
use crate::core::library::{CatalogError, CatalogResult};
use crate::core::repository::{DocumentStream, MutationOutcome};
use crate::utils::mongo::parse_execution_stats;

#[derive(Debug)]
pub struct MongoBookCollection {
    database: Database,
    collection: Collection<Document>,
}

impl MongoBookCollection {
    pub(crate) fn new(database: Database, collection: Collection<Document>) -> Self {
        Self {
            database,
            collection,
        }
    }
}

#[async_trait]
impl BookCollection for MongoBookCollection {
    async fn find(&self, filter: &BookFilter, options: &QueryOptions) -> CatalogResult<DocumentStream> {
        let filter_doc = filter.to_document();
        tracing::debug!(collection = %self.collection.name(), filter = %filter_doc, "find");
        let mut request = self.collection.find(filter_doc);
        if let Some(sort) = options.sort_document() {
            request = request.sort(sort);
        }
        if let Some(skip) = options.skip {
            request = request.skip(skip);
        }
        if let Some(limit) = options.limit {
            request = request.limit(limit);
        }
        if let Some(projection) = options.projection_document() {
            request = request.projection(projection);
        }
        let cursor = request.await?;
        Ok(cursor.map_err(CatalogError::from).boxed())
    }

    async fn count(&self, filter: &BookFilter) -> CatalogResult<u64> {
        self.collection
            .count_documents(filter.to_document())
            .await.map_err(CatalogError::from)
    }

    async fn update_one(&self, filter: &BookFilter, update: &BookUpdate) -> CatalogResult<MutationOutcome> {
        let filter_doc = filter.to_document();
        tracing::debug!(collection = %self.collection.name(), filter = %filter_doc, "update_one");
        self.collection
            .update_one(filter_doc, update.to_document())
            .await.map_err(CatalogError::from)
            .map(|res| MutationOutcome::new(res.matched_count, res.modified_count))
    }

    async fn delete_one(&self, filter: &BookFilter) -> CatalogResult<MutationOutcome> {
        let filter_doc = filter.to_document();
        tracing::debug!(collection = %self.collection.name(), filter = %filter_doc, "delete_one");
        self.collection
            .delete_one(filter_doc)
            .await.map_err(CatalogError::from)
            .map(|res| MutationOutcome::new(res.deleted_count, res.deleted_count))
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> CatalogResult<DocumentStream> {
        let stages = pipeline.to_documents();
        tracing::debug!(collection = %self.collection.name(), stages = stages.len(), "aggregate");
        let cursor = self.collection.aggregate(stages).await?;
        Ok(cursor.map_err(CatalogError::from).boxed())
    }

    // createIndexes with the same keys and name is a no-op on the server
    async fn create_index(&self, spec: &IndexSpec) -> CatalogResult<String> {
        let model = IndexModel::builder()
            .keys(spec.keys_document())
            .options(IndexOptions::builder().name(spec.name()).build())
            .build();
        self.collection
            .create_index(model)
            .await.map_err(CatalogError::from)
            .map(|res| res.index_name)
    }

    async fn drop_index(&self, name: &str) -> CatalogResult<()> {
        self.collection
            .drop_index(name)
            .await.map_err(CatalogError::from)
    }

    async fn list_index_names(&self) -> CatalogResult<Vec<String>> {
        self.collection
            .list_index_names()
            .await.map_err(CatalogError::from)
    }

    async fn explain(&self, filter: &BookFilter) -> CatalogResult<ExecutionStats> {
        let command = doc! {
            "explain": {
                "find": self.collection.name(),
                "filter": filter.to_document(),
            },
            "verbosity": "executionStats",
        };
        let reply = self.database.run_command(command).await?;
        parse_execution_stats(&reply)
    }
}
