use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use mongodb::bson::{self, Bson, Document};
use tokio::sync::RwLock;

use crate::books::domain::model::{Book, ExecutionStats};
use crate::books::domain::query::{Accumulator, BookFilter, BookUpdate, GroupKey, IndexSpec, Pipeline, QueryOptions, Stage, GROUP_VALUE_FIELD};
use crate::books::repository::BookCollection;
use crate::core::library::{BookField, CatalogError, CatalogResult, SortOrder};
use crate::core::repository::{DocumentStream, MutationOutcome};
use crate::utils::mongo::bson_number;

const ID_INDEX_NAME: &str = "_id_";

// MemoryBookCollection keeps books in insertion order inside the process and
// answers the same typed requests as the MongoDB collection. Clones share the
// same data.
#[derive(Debug, Clone)]
pub struct MemoryBookCollection {
    state: Arc<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    books: RwLock<Vec<Book>>,
    indexes: RwLock<Vec<(String, IndexSpec)>>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl MemoryBookCollection {
    pub fn new(books: Vec<Book>) -> Self {
        Self {
            state: Arc::new(MemoryState {
                books: RwLock::new(books),
                indexes: RwLock::new(vec![(ID_INDEX_NAME.to_string(), IndexSpec::ascending(&[BookField::Id]))]),
                offline: AtomicBool::new(false),
                requests: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn books(&self) -> Vec<Book> {
        self.state.books.read().await.clone()
    }

    // while offline every request fails the way an unreachable server does
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, AtomicOrdering::SeqCst);
    }

    // number of requests issued against this collection so far
    pub fn requests_issued(&self) -> usize {
        self.state.requests.load(AtomicOrdering::SeqCst)
    }

    fn begin(&self, operation: &str) -> CatalogResult<()> {
        self.state.requests.fetch_add(1, AtomicOrdering::SeqCst);
        tracing::debug!(operation, "memory collection request");
        if self.state.offline.load(AtomicOrdering::SeqCst) {
            return Err(CatalogError::connection(
                format!("{} failed: server unreachable", operation).as_str(),
                Some("ServerSelection".to_string()), true));
        }
        Ok(())
    }
}

impl Default for MemoryBookCollection {
    fn default() -> Self {
        Self::new(vec![])
    }
}

#[async_trait]
impl BookCollection for MemoryBookCollection {
    async fn find(&self, filter: &BookFilter, options: &QueryOptions) -> CatalogResult<DocumentStream> {
        self.begin("find")?;
        let mut matches: Vec<Book> = self.state.books.read().await
            .iter().filter(|b| filter.matches(b)).cloned().collect();
        if let Some((field, order)) = options.sort {
            // sort_by is stable, equal keys keep insertion order
            matches.sort_by(|a, b| {
                let ord = compare_field(a, b, field);
                if order == SortOrder::Descending { ord.reverse() } else { ord }
            });
        }
        let skip = options.skip.map(|s| usize::try_from(s).unwrap_or(usize::MAX)).unwrap_or(0);
        let limit = match options.limit {
            Some(n) if n != 0 => usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };
        let mut docs = Vec::new();
        for book in matches.into_iter().skip(skip).take(limit) {
            let doc = bson::to_document(&book)?;
            docs.push(Ok(project(doc, options.projection.as_deref())));
        }
        Ok(stream::iter(docs).boxed())
    }

    async fn count(&self, filter: &BookFilter) -> CatalogResult<u64> {
        self.begin("count")?;
        let books = self.state.books.read().await;
        Ok(books.iter().filter(|b| filter.matches(b)).count() as u64)
    }

    async fn update_one(&self, filter: &BookFilter, update: &BookUpdate) -> CatalogResult<MutationOutcome> {
        self.begin("update_one")?;
        let mut books = self.state.books.write().await;
        match books.iter_mut().find(|b| filter.matches(b)) {
            Some(book) => {
                let modified = update.apply(book);
                Ok(MutationOutcome::new(1, if modified { 1 } else { 0 }))
            }
            None => Ok(MutationOutcome::new(0, 0)),
        }
    }

    async fn delete_one(&self, filter: &BookFilter) -> CatalogResult<MutationOutcome> {
        self.begin("delete_one")?;
        let mut books = self.state.books.write().await;
        match books.iter().position(|b| filter.matches(b)) {
            Some(pos) => {
                books.remove(pos);
                Ok(MutationOutcome::new(1, 1))
            }
            None => Ok(MutationOutcome::new(0, 0)),
        }
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> CatalogResult<DocumentStream> {
        self.begin("aggregate")?;
        let mut rows = Vec::new();
        for book in self.state.books.read().await.iter() {
            rows.push(bson::to_document(book)?);
        }
        for stage in pipeline.stages() {
            rows = match stage {
                Stage::Group { key, accumulator } => group(rows, key, accumulator),
                Stage::SortByValue(order) => {
                    let mut sorted = rows;
                    sorted.sort_by(|a, b| {
                        let ord = compare_bson(a.get(GROUP_VALUE_FIELD), b.get(GROUP_VALUE_FIELD));
                        let ord = if *order == SortOrder::Descending { ord.reverse() } else { ord };
                        ord.then_with(|| compare_bson(a.get("_id"), b.get("_id")))
                    });
                    sorted
                }
                Stage::Limit(n) => {
                    let mut limited = rows;
                    limited.truncate(usize::try_from(*n).unwrap_or(0));
                    limited
                }
            };
        }
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn create_index(&self, spec: &IndexSpec) -> CatalogResult<String> {
        self.begin("create_index")?;
        let name = spec.name();
        let mut indexes = self.state.indexes.write().await;
        for (existing_name, existing) in indexes.iter() {
            if *existing_name == name && existing == spec {
                return Ok(name);
            }
            if *existing_name == name || existing == spec {
                return Err(CatalogError::database(
                    format!("index {} conflicts with existing index {}", name, existing_name).as_str(),
                    Some("IndexKeySpecsConflict".to_string()), false));
            }
        }
        indexes.push((name.to_string(), spec.clone()));
        Ok(name)
    }

    async fn drop_index(&self, name: &str) -> CatalogResult<()> {
        self.begin("drop_index")?;
        if name == ID_INDEX_NAME {
            return Err(CatalogError::database("cannot drop _id index", Some("InvalidOptions".to_string()), false));
        }
        let mut indexes = self.state.indexes.write().await;
        match indexes.iter().position(|(n, _)| n == name) {
            Some(pos) => {
                indexes.remove(pos);
                Ok(())
            }
            None => Err(CatalogError::index_not_found(format!("index not found with name [{}]", name).as_str())),
        }
    }

    async fn list_index_names(&self) -> CatalogResult<Vec<String>> {
        self.begin("list_index_names")?;
        Ok(self.state.indexes.read().await.iter().map(|(n, _)| n.to_string()).collect())
    }

    async fn explain(&self, filter: &BookFilter) -> CatalogResult<ExecutionStats> {
        self.begin("explain")?;
        let started = Instant::now();
        let books = self.state.books.read().await;
        let indexes = self.state.indexes.read().await;

        // pick the index with the longest key prefix constrained by the filter
        let mut best: Option<(&String, Vec<BookField>)> = None;
        for (name, spec) in indexes.iter() {
            let prefix: Vec<BookField> = spec.keys().iter()
                .map(|(field, _)| *field)
                .take_while(|field| filter.constrains(*field))
                .collect();
            if !prefix.is_empty() && best.as_ref().map_or(true, |(_, p)| prefix.len() > p.len()) {
                best = Some((name, prefix));
            }
        }

        let docs_returned = books.iter().filter(|b| filter.matches(b)).count() as u64;
        let stats = match best {
            Some((name, prefix)) => {
                let bounds = filter.conditions().iter()
                    .filter(|c| prefix.contains(&c.field()))
                    .fold(BookFilter::all(), |f, c| f.and(c.clone()));
                let scanned = books.iter().filter(|b| bounds.matches(b)).count() as u64;
                ExecutionStats {
                    docs_examined: scanned,
                    keys_examined: scanned,
                    docs_returned,
                    execution_time_millis: started.elapsed().as_millis() as u64,
                    winning_stage: "IXSCAN".to_string(),
                    index_name: Some(name.to_string()),
                }
            }
            None => ExecutionStats {
                docs_examined: books.len() as u64,
                keys_examined: 0,
                docs_returned,
                execution_time_millis: started.elapsed().as_millis() as u64,
                winning_stage: "COLLSCAN".to_string(),
                index_name: None,
            },
        };
        Ok(stats)
    }
}

fn compare_field(a: &Book, b: &Book, field: BookField) -> Ordering {
    match field {
        BookField::Id => a.id.cmp(&b.id),
        BookField::Title => a.title.cmp(&b.title),
        BookField::Author => a.author.cmp(&b.author),
        BookField::Genre => a.genre.cmp(&b.genre),
        BookField::PublishedYear => a.published_year.cmp(&b.published_year),
        BookField::Price => a.price.total_cmp(&b.price),
        BookField::InStock => a.in_stock.cmp(&b.in_stock),
    }
}

// nulls and missing values sort first, numbers compare by value, strings lexically
fn compare_bson(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let a = a.filter(|v| !matches!(v, Bson::Null));
    let b = b.filter(|v| !matches!(v, Bson::Null));
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => match (bson_number(x), bson_number(y)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

fn project(doc: Document, projection: Option<&[BookField]>) -> Document {
    match projection {
        Some(fields) => {
            let mut projected = Document::new();
            for (key, value) in doc {
                if fields.iter().any(|f| f.name() == key) {
                    projected.insert(key, value);
                }
            }
            projected
        }
        None => doc,
    }
}

fn group_key(row: &Document, key: &GroupKey) -> Bson {
    match key {
        GroupKey::Field(field) => row.get(field.name()).cloned().unwrap_or(Bson::Null),
        GroupKey::Decade => row.get(BookField::PublishedYear.name())
            .and_then(bson_number)
            .map(|year| Bson::Double((year / 10.0).floor() * 10.0))
            .unwrap_or(Bson::Null),
    }
}

// groups rows by key in order of first appearance, like $group without a sort
fn group(rows: Vec<Document>, key: &GroupKey, accumulator: &Accumulator) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for row in rows {
        let k = group_key(&row, key);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(row),
            None => groups.push((k, vec![row])),
        }
    }
    groups.into_iter().map(|(k, members)| {
        let value = match accumulator {
            Accumulator::Count => Bson::Int32(members.len() as i32),
            Accumulator::Average(field) => {
                let values: Vec<f64> = members.iter()
                    .filter_map(|m| m.get(field.name()).and_then(bson_number))
                    .collect();
                if values.is_empty() {
                    Bson::Null
                } else {
                    Bson::Double(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
        };
        let mut out = Document::new();
        out.insert("_id", k);
        out.insert(GROUP_VALUE_FIELD, value);
        out
    }).collect()
}
