use crate::books::domain::model::Book;
use crate::books::repository::BookCollection;
use crate::books::repository::memory_book_collection::MemoryBookCollection;
use crate::books::repository::mongo_book_collection::MongoBookCollection;
use crate::utils::mongo::MongoSession;

// The collection borrows the session's client; closing the session stays with the caller.
pub fn create_book_collection(session: &MongoSession) -> Box<dyn BookCollection> {
    Box::new(MongoBookCollection::new(session.database(), session.collection()))
}

pub fn create_memory_book_collection(books: Vec<Book>) -> Box<dyn BookCollection> {
    Box::new(MemoryBookCollection::new(books))
}
