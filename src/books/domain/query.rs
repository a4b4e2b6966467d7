use mongodb::bson::{doc, Bson, Document};
use crate::books::domain::model::{Book, BookId};
use crate::core::library::{BookField, SortOrder};

// Output field of every group stage, next to the group key in _id.
pub const GROUP_VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Id(BookId),
    Title(String),
    Author(String),
    Genre(String),
    InStock(bool),
    PublishedAfter(i32),
    PublishedBefore(i32),
    PublishedIn(i32),
}

impl Condition {
    pub fn field(&self) -> BookField {
        match self {
            Condition::Id(_) => BookField::Id,
            Condition::Title(_) => BookField::Title,
            Condition::Author(_) => BookField::Author,
            Condition::Genre(_) => BookField::Genre,
            Condition::InStock(_) => BookField::InStock,
            Condition::PublishedAfter(_) => BookField::PublishedYear,
            Condition::PublishedBefore(_) => BookField::PublishedYear,
            Condition::PublishedIn(_) => BookField::PublishedYear,
        }
    }

    pub fn matches(&self, book: &Book) -> bool {
        match self {
            Condition::Id(id) => book.id == *id,
            Condition::Title(title) => book.title == *title,
            Condition::Author(author) => book.author == *author,
            Condition::Genre(genre) => book.genre == *genre,
            Condition::InStock(in_stock) => book.in_stock == *in_stock,
            Condition::PublishedAfter(year) => book.published_year > *year,
            Condition::PublishedBefore(year) => book.published_year < *year,
            Condition::PublishedIn(year) => book.published_year == *year,
        }
    }
}

/// A conjunction of conditions over book fields. The empty filter matches
/// every book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilter {
    conditions: Vec<Condition>,
}

impl BookFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(condition: Condition) -> Self {
        Self::all().and(condition)
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn constrains(&self, field: BookField) -> bool {
        self.conditions.iter().any(|c| c.field() == field)
    }

    pub fn matches(&self, book: &Book) -> bool {
        self.conditions.iter().all(|c| c.matches(book))
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        for condition in &self.conditions {
            let key = condition.field().name();
            match condition {
                Condition::Id(id) => { filter.insert(key, id.object_id()); }
                Condition::Title(v) | Condition::Author(v) | Condition::Genre(v) => {
                    filter.insert(key, v.as_str());
                }
                Condition::InStock(v) => { filter.insert(key, *v); }
                Condition::PublishedIn(year) => { filter.insert(key, *year); }
                Condition::PublishedAfter(year) => add_range(&mut filter, key, "$gt", *year),
                Condition::PublishedBefore(year) => add_range(&mut filter, key, "$lt", *year),
            }
        }
        filter
    }
}

// Range conditions on the same field share one operator document,
// e.g. {published_year: {$gt: 1900, $lt: 2000}}.
fn add_range(filter: &mut Document, key: &str, op: &str, value: i32) {
    if let Some(Bson::Document(ops)) = filter.get_mut(key) {
        ops.insert(op, value);
        return;
    }
    filter.insert(key, doc! { op: value });
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub sort: Option<(BookField, SortOrder)>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Vec<BookField>>,
}

impl QueryOptions {
    pub fn sorted(field: BookField, order: SortOrder) -> Self {
        Self { sort: Some((field, order)), ..Self::default() }
    }

    pub fn sort_document(&self) -> Option<Document> {
        self.sort.map(|(field, order)| doc! { field.name(): order.direction() })
    }

    // _id is only returned when it is asked for
    pub fn projection_document(&self) -> Option<Document> {
        self.projection.as_ref().map(|fields| {
            let mut projection = Document::new();
            for field in fields {
                projection.insert(field.name(), 1);
            }
            if !fields.contains(&BookField::Id) {
                projection.insert(BookField::Id.name(), 0);
            }
            projection
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookUpdate {
    SetPrice(f64),
}

impl BookUpdate {
    pub fn to_document(&self) -> Document {
        match self {
            BookUpdate::SetPrice(price) => doc! { "$set": { BookField::Price.name(): *price } },
        }
    }

    pub fn apply(&self, book: &mut Book) -> bool {
        match self {
            BookUpdate::SetPrice(price) => {
                if book.price == *price {
                    return false;
                }
                book.price = *price;
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupKey {
    Field(BookField),
    // floor(published_year / 10) * 10
    Decade,
}

impl GroupKey {
    fn to_bson(&self) -> Bson {
        match self {
            GroupKey::Field(field) => Bson::String(format!("${}", field.name())),
            GroupKey::Decade => Bson::Document(doc! {
                "$multiply": [
                    { "$floor": { "$divide": [format!("${}", BookField::PublishedYear.name()), 10] } },
                    10
                ]
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accumulator {
    Average(BookField),
    Count,
}

impl Accumulator {
    fn to_document(&self) -> Document {
        match self {
            Accumulator::Average(field) => doc! { "$avg": format!("${}", field.name()) },
            Accumulator::Count => doc! { "$sum": 1 },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    // emits one {_id: key, value: accumulated} row per distinct key
    Group { key: GroupKey, accumulator: Accumulator },
    // orders group rows by value, ties by _id ascending
    SortByValue(SortOrder),
    Limit(i64),
}

impl Stage {
    pub fn to_document(&self) -> Document {
        match self {
            Stage::Group { key, accumulator } => doc! {
                "$group": {
                    "_id": key.to_bson(),
                    GROUP_VALUE_FIELD: accumulator.to_document(),
                }
            },
            Stage::SortByValue(order) => doc! {
                "$sort": { GROUP_VALUE_FIELD: order.direction(), "_id": 1 }
            },
            Stage::Limit(n) => doc! { "$limit": *n },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

/// Key specification of a secondary index. The name follows the server's
/// default `<field>_<direction>` form so it can always be derived from the
/// keys.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    keys: Vec<(BookField, SortOrder)>,
}

impl IndexSpec {
    pub fn ascending(fields: &[BookField]) -> Self {
        Self {
            keys: fields.iter().map(|f| (*f, SortOrder::Ascending)).collect(),
        }
    }

    pub fn keys(&self) -> &[(BookField, SortOrder)] {
        &self.keys
    }

    pub fn leading_field(&self) -> Option<BookField> {
        self.keys.first().map(|(field, _)| *field)
    }

    pub fn name(&self) -> String {
        self.keys.iter()
            .map(|(field, order)| format!("{}_{}", field.name(), order.direction()))
            .collect::<Vec<String>>()
            .join("_")
    }

    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, order) in &self.keys {
            keys.insert(field.name(), order.direction());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use crate::books::domain::model::Book;
    use crate::books::domain::query::{Accumulator, BookFilter, BookUpdate, Condition, GroupKey, IndexSpec, Pipeline, QueryOptions, Stage};
    use crate::core::library::{BookField, SortOrder};

    #[tokio::test]
    async fn test_should_render_filters() {
        assert_eq!(doc! {}, BookFilter::all().to_document());
        assert_eq!(doc! { "genre": "Gothic Fiction" },
                   BookFilter::with(Condition::Genre("Gothic Fiction".to_string())).to_document());

        let filter = BookFilter::with(Condition::InStock(true))
            .and(Condition::PublishedAfter(2010));
        assert_eq!(doc! { "in_stock": true, "published_year": { "$gt": 2010 } }, filter.to_document());

        let range = BookFilter::with(Condition::PublishedAfter(1900))
            .and(Condition::PublishedBefore(2000));
        assert_eq!(doc! { "published_year": { "$gt": 1900, "$lt": 2000 } }, range.to_document());
    }

    #[tokio::test]
    async fn test_should_match_books() {
        let book = Book::new("The Alchemist", "Paulo Coelho", "Fiction", 1988, 10.99, true);
        assert!(BookFilter::all().matches(&book));
        assert!(BookFilter::with(Condition::Author("Paulo Coelho".to_string()))
            .and(Condition::PublishedIn(1988)).matches(&book));
        assert!(!BookFilter::with(Condition::PublishedAfter(1988)).matches(&book));
        assert!(!BookFilter::with(Condition::Genre("fiction".to_string())).matches(&book));
        assert!(BookFilter::with(Condition::Id(book.id)).matches(&book));
    }

    #[tokio::test]
    async fn test_should_render_options() {
        let mut options = QueryOptions::sorted(BookField::Price, SortOrder::Descending);
        options.projection = Some(vec![BookField::Title, BookField::Price]);
        assert_eq!(Some(doc! { "price": -1 }), options.sort_document());
        assert_eq!(Some(doc! { "title": 1, "price": 1, "_id": 0 }), options.projection_document());
        assert_eq!(None, QueryOptions::default().projection_document());
    }

    #[tokio::test]
    async fn test_should_render_updates() {
        assert_eq!(doc! { "$set": { "price": 20.99 } }, BookUpdate::SetPrice(20.99).to_document());
        let mut book = Book::new("Emma", "Jane Austen", "Romance", 1815, 7.5, true);
        assert!(BookUpdate::SetPrice(8.0).apply(&mut book));
        assert!(!BookUpdate::SetPrice(8.0).apply(&mut book));
        assert_eq!(8.0, book.price);
    }

    #[tokio::test]
    async fn test_should_render_pipelines() {
        let pipeline = Pipeline::new()
            .then(Stage::Group { key: GroupKey::Field(BookField::Author), accumulator: Accumulator::Count })
            .then(Stage::SortByValue(SortOrder::Descending))
            .then(Stage::Limit(1));
        assert_eq!(vec![
            doc! { "$group": { "_id": "$author", "value": { "$sum": 1 } } },
            doc! { "$sort": { "value": -1, "_id": 1 } },
            doc! { "$limit": 1_i64 },
        ], pipeline.to_documents());

        let decades = Pipeline::new()
            .then(Stage::Group { key: GroupKey::Decade, accumulator: Accumulator::Count });
        assert_eq!(vec![
            doc! { "$group": {
                "_id": { "$multiply": [ { "$floor": { "$divide": ["$published_year", 10] } }, 10 ] },
                "value": { "$sum": 1 },
            } },
        ], decades.to_documents());
    }

    #[tokio::test]
    async fn test_should_derive_index_names() {
        let title = IndexSpec::ascending(&[BookField::Title]);
        assert_eq!("title_1", title.name());
        let compound = IndexSpec::ascending(&[BookField::Author, BookField::PublishedYear]);
        assert_eq!("author_1_published_year_1", compound.name());
        assert_eq!(doc! { "author": 1, "published_year": 1 }, compound.keys_document());
        assert_eq!(Some(BookField::Author), compound.leading_field());
    }
}
