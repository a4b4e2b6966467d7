use std::time::Duration;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{Error, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use crate::books::domain::model::ExecutionStats;
use crate::core::domain::Configuration;
use crate::core::library::{CatalogError, CatalogResult};

// Server error code returned when dropping an index that does not exist.
const INDEX_NOT_FOUND_CODE: i32 = 27;

// MongoSession owns the client of one logical session. The caller opens it
// once and must close it on every exit path.
#[derive(Debug)]
pub struct MongoSession {
    client: Client,
    database: Database,
    collection_name: String,
}

impl MongoSession {
    /// Builds the client and pings the server so an unreachable endpoint
    /// surfaces as a `Connection` error here rather than on the first query.
    pub async fn connect(config: &Configuration) -> CatalogResult<Self> {
        let mut options = ClientOptions::parse(config.mongo_uri.as_str()).await?;
        options.app_name = Some(config.app_name.to_string());
        options.server_selection_timeout = Some(Duration::from_secs(config.server_selection_timeout_secs));
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        tracing::info!(database = %config.database_name, collection = %config.collection_name,
            "connected to mongodb");

        let database = client.database(config.database_name.as_str());
        Ok(Self {
            client,
            database,
            collection_name: config.collection_name.to_string(),
        })
    }

    pub fn database(&self) -> Database {
        self.database.clone()
    }

    pub fn collection(&self) -> Collection<Document> {
        self.database.collection::<Document>(self.collection_name.as_str())
    }

    pub async fn close(self) {
        self.client.shutdown().await;
        tracing::info!("connection closed");
    }
}

// installs the JSON log subscriber used by the driver binary
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        // module paths add nothing to the query log lines
        .with_target(false)
        .with_ansi(false)
        .without_time()
        .json()
        .init();
}

pub(crate) fn bson_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

pub(crate) fn bson_count(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) if *n >= 0 => Some(*n as u64),
        Bson::Int64(n) if *n >= 0 => Some(*n as u64),
        Bson::Double(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as u64),
        _ => None,
    }
}

fn stat(stats: &Document, name: &str) -> u64 {
    stats.get(name).and_then(bson_count).unwrap_or(0)
}

// Parses the reply of an explain run with executionStats verbosity.
pub(crate) fn parse_execution_stats(explain: &Document) -> CatalogResult<ExecutionStats> {
    let stats = explain.get_document("executionStats").map_err(|err| CatalogError::serialization(
        format!("explain reply without executionStats: {}", err).as_str()))?;
    let (winning_stage, index_name) = explain.get_document("queryPlanner")
        .and_then(|planner| planner.get_document("winningPlan"))
        .ok()
        .and_then(find_scan_stage)
        .unwrap_or(("UNKNOWN".to_string(), None));

    Ok(ExecutionStats {
        docs_examined: stat(stats, "totalDocsExamined"),
        keys_examined: stat(stats, "totalKeysExamined"),
        docs_returned: stat(stats, "nReturned"),
        execution_time_millis: stat(stats, "executionTimeMillis"),
        winning_stage,
        index_name,
    })
}

// Walks the plan tree down to the stage that reads the collection or an index.
fn find_scan_stage(plan: &Document) -> Option<(String, Option<String>)> {
    if let Ok(stage) = plan.get_str("stage") {
        if stage == "COLLSCAN" || stage == "IXSCAN" {
            let index_name = plan.get_str("indexName").ok().map(str::to_string);
            return Some((stage.to_string(), index_name));
        }
    }
    for child in ["queryPlan", "inputStage"] {
        if let Ok(next) = plan.get_document(child) {
            if let Some(found) = find_scan_stage(next) {
                return Some(found);
            }
        }
    }
    if let Ok(children) = plan.get_array("inputStages") {
        for child in children {
            if let Bson::Document(next) = child {
                if let Some(found) = find_scan_stage(next) {
                    return Some(found);
                }
            }
        }
    }
    None
}

impl From<Error> for CatalogError {
    fn from(err: Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { message, .. } => {
                CatalogError::connection(format!("server selection failed: {}", message).as_str(),
                                         Some("ServerSelection".to_string()), true)
            }
            ErrorKind::DnsResolve { message, .. } => {
                CatalogError::connection(format!("dns resolution failed: {}", message).as_str(),
                                         Some("DnsResolve".to_string()), true)
            }
            ErrorKind::ConnectionPoolCleared { message, .. } => {
                CatalogError::connection(format!("connection pool cleared: {}", message).as_str(),
                                         Some("ConnectionPoolCleared".to_string()), true)
            }
            ErrorKind::Io(io_err) => {
                CatalogError::connection(format!("io failure: {}", io_err).as_str(),
                                         Some(format!("{:?}", io_err.kind())), true)
            }
            ErrorKind::Authentication { message, .. } => {
                CatalogError::connection(format!("authentication failed: {}", message).as_str(),
                                         Some("Authentication".to_string()), false)
            }
            ErrorKind::Command(cmd) if cmd.code == INDEX_NOT_FOUND_CODE || cmd.code_name == "IndexNotFound" => {
                CatalogError::index_not_found(cmd.message.as_str())
            }
            ErrorKind::Command(cmd) => {
                CatalogError::database(format!("command failed: {}", cmd.message).as_str(),
                                       Some(cmd.code_name.to_string()), false)
            }
            ErrorKind::InvalidArgument { message, .. } => {
                CatalogError::validation(message.as_str(), Some("InvalidArgument".to_string()))
            }
            ErrorKind::BsonDeserialization(de_err) => {
                CatalogError::serialization(format!("bson decoding {}", de_err).as_str())
            }
            ErrorKind::BsonSerialization(ser_err) => {
                CatalogError::serialization(format!("bson encoding {}", ser_err).as_str())
            }
            _ => {
                CatalogError::database(format!("mongodb error {}", err).as_str(), None, false)
            }
        }
    }
}

impl From<bson::de::Error> for CatalogError {
    fn from(err: bson::de::Error) -> Self {
        CatalogError::serialization(
            format!("bson decoding {}", err).as_str())
    }
}

impl From<bson::ser::Error> for CatalogError {
    fn from(err: bson::ser::Error) -> Self {
        CatalogError::serialization(
            format!("bson encoding {}", err).as_str())
    }
}
