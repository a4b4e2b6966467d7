use serde::{Deserialize, Serialize};
use crate::core::library::{CatalogError, CatalogResult};

const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
const DEFAULT_DATABASE: &str = "plp_bookstore";
const DEFAULT_COLLECTION: &str = "books";
const DEFAULT_APP_NAME: &str = "catalog-queries";

// Configuration abstracts the connection and demo options of the catalog
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Configuration {
    pub mongo_uri: String,
    pub database_name: String,
    pub collection_name: String,
    pub server_selection_timeout_secs: u64,
    pub app_name: String,
    pub demo: DemoOptions,
}

// DemoOptions controls the mutating steps of the query walkthrough
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DemoOptions {
    pub price_update_id: Option<String>,
    pub new_price: f64,
    pub run_mutations: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        DemoOptions {
            price_update_id: None,
            new_price: 20.99,
            run_mutations: false,
        }
    }
}

impl Configuration {
    pub fn new(mongo_uri: &str) -> Self {
        Configuration {
            mongo_uri: mongo_uri.to_string(),
            database_name: DEFAULT_DATABASE.to_string(),
            collection_name: DEFAULT_COLLECTION.to_string(),
            server_selection_timeout_secs: 5,
            app_name: DEFAULT_APP_NAME.to_string(),
            demo: DemoOptions::default(),
        }
    }

    /// Loads configuration from the process environment, reading `.env` first
    /// when one exists.
    pub fn from_env() -> CatalogResult<Self> {
        // a missing .env file is not an error
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> CatalogResult<Self>
        where F: Fn(&str) -> Option<String> {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut config = Configuration::new(
            non_empty("MONGO_URI").unwrap_or(DEFAULT_MONGO_URI.to_string()).as_str());
        if let Some(database) = non_empty("BOOKSTORE_DATABASE") {
            config.database_name = database;
        }
        if let Some(collection) = non_empty("BOOKSTORE_COLLECTION") {
            config.collection_name = collection;
        }
        if let Some(timeout) = non_empty("BOOKSTORE_SERVER_SELECTION_TIMEOUT_SECS") {
            config.server_selection_timeout_secs = timeout.parse::<u64>().map_err(|err| CatalogError::validation(
                format!("invalid BOOKSTORE_SERVER_SELECTION_TIMEOUT_SECS {:?}: {}", timeout, err).as_str(), None))?;
        }
        config.demo.price_update_id = non_empty("BOOKSTORE_PRICE_UPDATE_ID");
        if let Some(price) = non_empty("BOOKSTORE_NEW_PRICE") {
            config.demo.new_price = price.parse::<f64>().map_err(|err| CatalogError::validation(
                format!("invalid BOOKSTORE_NEW_PRICE {:?}: {}", price, err).as_str(), None))?;
        }
        if let Some(flag) = non_empty("BOOKSTORE_RUN_MUTATIONS") {
            config.demo.run_mutations = match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(CatalogError::validation(
                        format!("invalid BOOKSTORE_RUN_MUTATIONS {:?}", other).as_str(), None));
                }
            };
        }
        Ok(config)
    }
}
