use std::fmt;
use std::fmt::{Display, Formatter};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use crate::core::library::{CatalogError, CatalogResult};

// BookId is the store-assigned identifier of a book, kept as the document _id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(ObjectId);

impl BookId {
    pub fn new() -> Self {
        BookId(ObjectId::new())
    }

    pub fn parse(id: &str) -> CatalogResult<Self> {
        ObjectId::parse_str(id.trim()).map(BookId).map_err(|err| CatalogError::validation(
            format!("malformed book id {:?}: {}", id, err).as_str(), Some("MalformedId".to_string())))
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BookId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

// Book is a single record of the books collection. Decoding fails when any of
// the fields is missing, extra stored fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id")]
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
}

impl Book {
    pub fn new(title: &str, author: &str, genre: &str,
               published_year: i32, price: f64, in_stock: bool) -> Self {
        Self {
            id: BookId::new(),
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            published_year,
            price,
            in_stock,
        }
    }
}

// BookProjection holds only the fields requested by a projected find.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookProjection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub book_count: u64,
}

// ExecutionStats summarizes an executionStats explain of a find.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub docs_examined: u64,
    pub keys_examined: u64,
    pub docs_returned: u64,
    pub execution_time_millis: u64,
    // COLLSCAN or IXSCAN
    pub winning_stage: String,
    pub index_name: Option<String>,
}

impl ExecutionStats {
    pub fn used_index(&self) -> bool {
        self.index_name.is_some()
    }
}
