use super::matcher::matches;
use super::pipeline::{apply_projection, run_pipeline, sort_documents};
use super::update::{apply_update, upsert_seed};
use crate::common::util::bson_equals;
use crate::common::DOC_ID;
use crate::errors::{ErrorKind, PersistError, PersistResult};
use crate::store::{
    DocumentStream, FindOptions, RemoveResult, StoreDriver, UpdateOptions, UpdateResult,
};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// The kind of a driver call recorded by [`InMemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Count,
    Find,
    FindOne,
    Insert,
    Update,
    RemoveOne,
    RemoveMany,
    Aggregate,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Count => write!(f, "count"),
            OperationKind::Find => write!(f, "find"),
            OperationKind::FindOne => write!(f, "find_one"),
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::RemoveOne => write!(f, "remove_one"),
            OperationKind::RemoveMany => write!(f, "remove_many"),
            OperationKind::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOperation {
    pub kind: OperationKind,
    pub collection: String,
    /// The query, update or pipeline stages passed with the call.
    pub arguments: Vec<Document>,
}

/// A [`StoreDriver`] keeping every collection in process memory.
///
/// Besides serving as an embedded store, it records each call it receives
/// and can be told to fail the next call of a given kind, which makes the
/// repository's call sequence observable in tests.
///
/// Cloning is cheap; clones share the same data.
///
/// # Examples
///
/// ```rust
/// use docpersist::store::memory::{InMemoryStore, OperationKind};
/// use docpersist::store::StoreDriver;
/// use bson::doc;
///
/// # tokio_test_block(async {
/// let store = InMemoryStore::new();
/// store.insert("users", doc! { "name": "Ada" }).await.unwrap();
/// assert_eq!(store.count("users", &doc! {}).await.unwrap(), 1);
/// assert_eq!(store.operation_count(OperationKind::Insert), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    collections: DashMap<String, Vec<Document>>,
    operations: Mutex<Vec<StoreOperation>>,
    failures: Mutex<HashMap<OperationKind, String>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    /// Returns a snapshot of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .collections
            .get(collection)
            .map(|documents| documents.value().clone())
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn drop_collection(&self, collection: &str) {
        self.inner.collections.remove(collection);
    }

    /// Every call received so far, oldest first.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.inner.operations.lock().clone()
    }

    pub fn operation_count(&self, kind: OperationKind) -> usize {
        self.inner
            .operations
            .lock()
            .iter()
            .filter(|operation| operation.kind == kind)
            .count()
    }

    pub fn clear_operations(&self) {
        self.inner.operations.lock().clear();
    }

    /// Makes the next call of `kind` fail with a driver error carrying `message`.
    pub fn fail_next(&self, kind: OperationKind, message: &str) {
        self.inner.failures.lock().insert(kind, message.to_string());
    }

    fn record(
        &self,
        kind: OperationKind,
        collection: &str,
        arguments: Vec<Document>,
    ) -> PersistResult<()> {
        log::debug!("{} on collection {}", kind, collection);
        self.inner.operations.lock().push(StoreOperation {
            kind,
            collection: collection.to_string(),
            arguments,
        });

        if let Some(message) = self.inner.failures.lock().remove(&kind) {
            log::error!("Injected {} failure on {}: {}", kind, collection, message);
            return Err(PersistError::new(&message, ErrorKind::DriverFailure));
        }
        Ok(())
    }

    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.documents(collection)
    }

    fn filter(&self, collection: &str, query: &Document) -> PersistResult<Vec<Document>> {
        let mut found = Vec::new();
        if let Some(documents) = self.inner.collections.get(collection) {
            for document in documents.iter() {
                if matches(document, query)? {
                    found.push(document.clone());
                }
            }
        }
        Ok(found)
    }

    fn insert_document(&self, collection: &str, mut document: Document) -> PersistResult<Bson> {
        let id = match document.get(DOC_ID) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert(DOC_ID, id.clone());
                for (key, value) in document {
                    with_id.insert(key, value);
                }
                document = with_id;
                id
            }
        };

        let mut documents = self.inner.collections.entry(collection.to_string()).or_default();
        if documents
            .iter()
            .any(|existing| existing.get(DOC_ID).is_some_and(|other| bson_equals(other, &id)))
        {
            log::error!("Duplicate key {} in collection {}", id, collection);
            return Err(PersistError::new(
                &format!("Duplicate key {} in collection {}", id, collection),
                ErrorKind::DriverFailure,
            ));
        }
        documents.push(document);
        Ok(id)
    }

    fn remove(
        &self,
        collection: &str,
        query: &Document,
        limit: Option<usize>,
    ) -> PersistResult<RemoveResult> {
        let Some(mut documents) = self.inner.collections.get_mut(collection) else {
            return Ok(RemoveResult::new(0));
        };

        let mut doomed = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if limit.is_some_and(|limit| doomed.len() >= limit) {
                break;
            }
            if matches(document, query)? {
                doomed.push(index);
            }
        }
        for index in doomed.iter().rev() {
            documents.remove(*index);
        }
        Ok(RemoveResult::new(doomed.len() as u64))
    }
}

#[async_trait]
impl StoreDriver for InMemoryStore {
    async fn count(&self, collection: &str, query: &Document) -> PersistResult<u64> {
        self.record(OperationKind::Count, collection, vec![query.clone()])?;
        Ok(self.filter(collection, query)?.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> PersistResult<Vec<Document>> {
        self.record(OperationKind::Find, collection, vec![query.clone()])?;

        let mut found = self.filter(collection, query)?;
        if let Some(sort) = options.sort_spec() {
            sort_documents(&mut found, &sort.to_document());
        }

        let skip = usize::try_from(options.skip_count()).unwrap_or(usize::MAX);
        let limit = options
            .limit_count()
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match options.projection_document() {
                Some(projection) => apply_projection(&document, projection),
                None => document,
            })
            .collect())
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
        projection: Option<&Document>,
    ) -> PersistResult<Option<Document>> {
        self.record(OperationKind::FindOne, collection, vec![query.clone()])?;

        if let Some(documents) = self.inner.collections.get(collection) {
            for document in documents.iter() {
                if matches(document, query)? {
                    return Ok(Some(match projection {
                        Some(projection) => apply_projection(document, projection),
                        None => document.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn insert(&self, collection: &str, document: Document) -> PersistResult<Bson> {
        self.record(OperationKind::Insert, collection, vec![document.clone()])?;
        self.insert_document(collection, document)
    }

    async fn update_with_options(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> PersistResult<UpdateResult> {
        self.record(
            OperationKind::Update,
            collection,
            vec![query.clone(), update.clone()],
        )?;

        let mut matched = 0u64;
        let mut modified = 0u64;
        if let Some(mut documents) = self.inner.collections.get_mut(collection) {
            for document in documents.iter_mut() {
                if !matches(document, query)? {
                    continue;
                }
                matched += 1;

                let mut updated = document.clone();
                if apply_update(&mut updated, update)? {
                    *document = updated;
                    modified += 1;
                }
                if !options.is_multi() {
                    break;
                }
            }
        }

        if matched == 0 && options.is_upsert() {
            let seed = upsert_seed(query, update)?;
            let id = self.insert_document(collection, seed)?;
            return Ok(UpdateResult::new(0, 0, Some(id)));
        }
        Ok(UpdateResult::new(matched, modified, None))
    }

    async fn remove_one(&self, collection: &str, query: &Document) -> PersistResult<RemoveResult> {
        self.record(OperationKind::RemoveOne, collection, vec![query.clone()])?;
        self.remove(collection, query, Some(1))
    }

    async fn remove_many(&self, collection: &str, query: &Document) -> PersistResult<RemoveResult> {
        self.record(OperationKind::RemoveMany, collection, vec![query.clone()])?;
        self.remove(collection, query, None)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> PersistResult<DocumentStream> {
        self.record(OperationKind::Aggregate, collection, pipeline.clone())?;
        let output = run_pipeline(self.snapshot(collection), &pipeline)?;
        Ok(Box::pin(futures::stream::iter(output.into_iter().map(Ok))))
    }
}
