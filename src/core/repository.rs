use futures::stream::BoxStream;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use crate::core::library::{CatalogError, CatalogResult};

// Raw documents as streamed back from a collection. Every call issues a new
// request, so a stream can be restarted by calling the operation again.
pub type DocumentStream = BoxStream<'static, CatalogResult<Document>>;

// Decoded entities streamed back from a collection
pub type EntityStream<T> = BoxStream<'static, CatalogResult<T>>;

// MutationOutcome reports what a single-document update or delete touched
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct MutationOutcome {
    // documents that matched the filter
    pub matched: u64,
    // documents modified or removed
    pub affected: u64,
}

impl MutationOutcome {
    pub fn new(matched: u64, affected: u64) -> Self {
        Self { matched, affected }
    }

    pub fn count(&self) -> u64 {
        self.affected
    }

    pub fn found(&self) -> bool {
        self.matched > 0
    }

    /// Turns an outcome that matched nothing into a `NotFound` error for
    /// callers that treat a missing target as fatal.
    pub fn require_found(self, what: &str) -> CatalogResult<Self> {
        if self.found() {
            Ok(self)
        } else {
            Err(CatalogError::not_found(format!("{} not found", what).as_str()))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::repository::MutationOutcome;

    #[tokio::test]
    async fn test_should_require_found() {
        let outcome = MutationOutcome::new(1, 0);
        assert!(outcome.found());
        assert_eq!(0, outcome.count());
        assert_eq!(outcome, outcome.require_found("book").expect("should be found"));

        let missing = MutationOutcome::new(0, 0);
        assert!(!missing.found());
        assert!(matches!(missing.require_found("book"), Err(crate::core::library::CatalogError::NotFound { .. })));
    }
}
