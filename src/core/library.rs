use std::fmt;
use std::fmt::{Display, Formatter};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum CatalogError {
    // Bad input detected before any request is sent to the store.
    Validation {
        message: String,
        reason_code: Option<String>,
    },
    // The store could not be reached or did not answer in time. Never retried
    // here, the retryable flag only tells the caller whether a retry may help.
    Connection {
        message: String,
        reason_code: Option<String>,
        retryable: bool,
    },
    NotFound {
        message: String,
    },
    IndexNotFound {
        message: String,
    },
    Database {
        message: String,
        reason_code: Option<String>,
        retryable: bool,
    },
    Serialization {
        message: String,
    },
    Runtime {
        message: String,
        reason_code: Option<String>,
    },
}

impl CatalogError {
    pub fn validation(message: &str, reason_code: Option<String>) -> CatalogError {
        CatalogError::Validation { message: message.to_string(), reason_code }
    }

    pub fn connection(message: &str, reason_code: Option<String>, retryable: bool) -> CatalogError {
        CatalogError::Connection { message: message.to_string(), reason_code, retryable }
    }

    pub fn not_found(message: &str) -> CatalogError {
        CatalogError::NotFound { message: message.to_string() }
    }

    pub fn index_not_found(message: &str) -> CatalogError {
        CatalogError::IndexNotFound { message: message.to_string() }
    }

    pub fn database(message: &str, reason_code: Option<String>, retryable: bool) -> CatalogError {
        CatalogError::Database { message: message.to_string(), reason_code, retryable }
    }

    pub fn serialization(message: &str) -> CatalogError {
        CatalogError::Serialization { message: message.to_string() }
    }

    pub fn runtime(message: &str, reason_code: Option<String>) -> CatalogError {
        CatalogError::Runtime { message: message.to_string(), reason_code }
    }

    pub fn retryable(&self) -> bool {
        match self {
            CatalogError::Validation { .. } => { false }
            CatalogError::Connection { retryable, .. } => { *retryable }
            CatalogError::NotFound { .. } => { false }
            CatalogError::IndexNotFound { .. } => { false }
            CatalogError::Database { retryable, .. } => { *retryable }
            CatalogError::Serialization { .. } => { false }
            CatalogError::Runtime { .. } => { false }
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CatalogError::Validation { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CatalogError::Connection { .. })
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::runtime(
            format!("io {:?}", err).as_str(), None)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::serialization(
            format!("serde json parsing {:?}", err).as_str())
    }
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Validation { message, reason_code } => {
                write!(f, "{} {:?}", message, reason_code)
            }
            CatalogError::Connection { message, reason_code, retryable } => {
                write!(f, "{} {:?} {}", message, reason_code, retryable)
            }
            CatalogError::NotFound { message } => {
                write!(f, "{}", message)
            }
            CatalogError::IndexNotFound { message } => {
                write!(f, "{}", message)
            }
            CatalogError::Database { message, reason_code, retryable } => {
                write!(f, "{} {:?} {}", message, reason_code, retryable)
            }
            CatalogError::Serialization { message } => {
                write!(f, "{}", message)
            }
            CatalogError::Runtime { message, reason_code } => {
                write!(f, "{} {:?}", message, reason_code)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// A specialized Result type for catalog queries.
pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending { SortOrder::Ascending } else { SortOrder::Descending }
    }

    // direction as stored in sort and index key documents
    pub fn direction(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "Ascending"),
            SortOrder::Descending => write!(f, "Descending"),
        }
    }
}

// Fields stored on a book document.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum BookField {
    Id,
    Title,
    Author,
    Genre,
    PublishedYear,
    Price,
    InStock,
}

impl BookField {
    pub fn name(&self) -> &'static str {
        match self {
            BookField::Id => "_id",
            BookField::Title => "title",
            BookField::Author => "author",
            BookField::Genre => "genre",
            BookField::PublishedYear => "published_year",
            BookField::Price => "price",
            BookField::InStock => "in_stock",
        }
    }

    pub fn parse(name: &str) -> CatalogResult<BookField> {
        match name.trim() {
            "_id" | "id" => Ok(BookField::Id),
            "title" => Ok(BookField::Title),
            "author" => Ok(BookField::Author),
            "genre" => Ok(BookField::Genre),
            "published_year" => Ok(BookField::PublishedYear),
            "price" => Ok(BookField::Price),
            "in_stock" => Ok(BookField::InStock),
            other => Err(CatalogError::validation(
                format!("unknown book field {:?}", other).as_str(), Some("UnknownField".to_string()))),
        }
    }
}

impl Display for BookField {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
