use super::{FindOptions, RemoveResult, UpdateOptions, UpdateResult};
use crate::errors::PersistResult;
use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;

/// A stream of documents produced by an aggregation.
pub type DocumentStream = BoxStream<'static, PersistResult<Document>>;

/// The document-store operations the persistence layer relies on.
///
/// Implementations wrap an already pooled connection to a document store.
/// Errors are reported with [`ErrorKind::DriverFailure`](crate::errors::ErrorKind::DriverFailure)
/// and propagated unchanged by the repository.
///
/// # Example
///
/// ```ignore
/// let store: Arc<dyn StoreDriver> = Arc::new(InMemoryStore::new());
/// let id = store.insert("users", doc! { "name": "Ada" }).await?;
/// let total = store.count("users", &doc! {}).await?;
/// ```
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Counts the documents matching `query`.
    async fn count(&self, collection: &str, query: &Document) -> PersistResult<u64>;

    /// Returns the documents matching `query` inside the window and order of `options`.
    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> PersistResult<Vec<Document>>;

    /// Returns the first document matching `query`, if any.
    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
        projection: Option<&Document>,
    ) -> PersistResult<Option<Document>>;

    /// Inserts a document and returns its identifier, generating one if absent.
    async fn insert(&self, collection: &str, document: Document) -> PersistResult<Bson>;

    /// Applies an update expression (`$set`, `$unset`) to the matching documents.
    async fn update_with_options(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> PersistResult<UpdateResult>;

    /// Removes the first document matching `query`.
    async fn remove_one(&self, collection: &str, query: &Document) -> PersistResult<RemoveResult>;

    /// Removes every document matching `query`.
    async fn remove_many(&self, collection: &str, query: &Document) -> PersistResult<RemoveResult>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> PersistResult<DocumentStream>;
}
