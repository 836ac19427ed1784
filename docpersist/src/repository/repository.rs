use super::{Page, RepositoryBuilder, RepositoryConfig};
use crate::aggregation::{element_path_segments, AggregationBuilder};
use crate::common::util::{as_i64, is_inclusion_projection};
use crate::common::{SortSpec, SubscriberRef, COUNT_FIELD, DOC_ID, OP_SET, OP_UNSET};
use crate::errors::{ErrorKind, PersistError, PersistResult};
use crate::migration::{
    legacy_filter, MigrationEventBus, MigrationEventListener, MigrationHandle, MigrationLeases,
    MigrationOutcome, MigrationRun, SchemaModel,
};
use crate::query::Query;
use crate::store::{multi, FindOptions, StoreDriver, UpdateOptions, UpdateResult};
use bson::{Bson, Document};
use futures::TryStreamExt;
use std::sync::Arc;

/// The persistence façade over a document store.
///
/// A repository stamps every document it writes with the configured schema
/// tag and hides that tag from everything it reads. It is cheap to clone;
/// clones share the driver, the configuration, the migration leases and
/// the event bus.
///
/// # Examples
///
/// ```rust
/// use docpersist::query::Query;
/// use docpersist::repository::Repository;
/// use docpersist::store::memory::InMemoryStore;
/// use bson::doc;
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let repository = Repository::builder(Arc::new(InMemoryStore::new())).build().unwrap();
/// let stored = repository.store_one_document("users", doc! { "name": "Ada" }).await.unwrap();
/// let id = stored.get("_id").unwrap().clone();
///
/// let found = repository.find_one_document("users", &Query::by_id(id), None).await.unwrap();
/// assert_eq!(found.get_str("name").unwrap(), "Ada");
/// assert!(!found.contains_key("_schema"));
/// # });
/// ```
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    driver: Arc<dyn StoreDriver>,
    config: RepositoryConfig,
    leases: MigrationLeases,
    event_bus: MigrationEventBus,
}

impl Repository {
    pub fn builder(driver: Arc<dyn StoreDriver>) -> RepositoryBuilder {
        RepositoryBuilder::new(driver)
    }

    pub(crate) fn new(driver: Arc<dyn StoreDriver>, config: RepositoryConfig) -> Self {
        Repository {
            inner: Arc::new(RepositoryInner {
                driver,
                config,
                leases: MigrationLeases::new(),
                event_bus: MigrationEventBus::new(),
            }),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    pub fn driver(&self) -> Arc<dyn StoreDriver> {
        self.inner.driver.clone()
    }

    pub(crate) fn leases(&self) -> &MigrationLeases {
        &self.inner.leases
    }

    pub(crate) fn event_bus(&self) -> &MigrationEventBus {
        &self.inner.event_bus
    }

    /// Registers a listener for migration events.
    pub fn subscribe(&self, listener: MigrationEventListener) -> PersistResult<SubscriberRef> {
        self.inner.event_bus.register(listener)
    }

    pub fn unsubscribe(&self, subscriber: SubscriberRef) -> PersistResult<()> {
        self.inner.event_bus.deregister(subscriber)
    }

    /// Counts the documents matching `query`.
    pub async fn count_documents(&self, collection: &str, query: &Query) -> PersistResult<u64> {
        self.inner.driver.count(collection, query.as_document()).await
    }

    /// Finds the documents matching `query` with the schema tag removed.
    pub async fn find_documents(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
    ) -> PersistResult<Vec<Document>> {
        let options = options
            .clone()
            .projection(self.hide_tag(options.projection_document()));
        let found = self
            .inner
            .driver
            .find(collection, query.as_document(), &options)
            .await?;
        Ok(found.into_iter().map(|document| self.strip_tag(document)).collect())
    }

    /// Returns one window of the documents matching `query`.
    ///
    /// Only counts when the window starts at or past the last match.
    pub async fn search_page_object(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
        result_key: &str,
    ) -> PersistResult<Page<Document>> {
        self.search_page_object_with(collection, query, options, result_key, Ok)
            .await
    }

    /// Like [`search_page_object`](Self::search_page_object), converting
    /// every document with `map`.
    pub async fn search_page_object_with<T, F>(
        &self,
        collection: &str,
        query: &Query,
        options: &FindOptions,
        result_key: &str,
        map: F,
    ) -> PersistResult<Page<T>>
    where
        F: FnMut(Document) -> PersistResult<T>,
    {
        let offset = options.skip_count();
        let total = self.count_documents(collection, query).await?;
        if total == 0 || offset >= total {
            return Ok(Page::empty(offset, total, result_key));
        }

        let found = self.find_documents(collection, query, options).await?;
        Page::new(offset, total, result_key, found).try_map(map)
    }

    /// Inserts `document` stamped with the current schema version.
    ///
    /// Returns the document as stored, with its identifier and without the
    /// schema tag.
    pub async fn store_one_document(
        &self,
        collection: &str,
        document: Document,
    ) -> PersistResult<Document> {
        self.store_one_document_with(collection, document, Ok).await
    }

    pub async fn store_one_document_with<T, F>(
        &self,
        collection: &str,
        mut document: Document,
        map: F,
    ) -> PersistResult<T>
    where
        F: FnOnce(Document) -> PersistResult<T>,
    {
        let config = self.config();
        document.insert(config.schema_tag_field(), config.schema_version());

        let id = self.inner.driver.insert(collection, document.clone()).await?;
        let mut stored = self.strip_tag(document);
        if !stored.contains_key(DOC_ID) {
            let mut with_id = Document::new();
            with_id.insert(DOC_ID, id);
            for (key, value) in stored {
                with_id.insert(key, value);
            }
            stored = with_id;
        }
        map(stored)
    }

    /// Finds the first document matching `query`.
    ///
    /// `fields` is an inclusion or exclusion projection; the schema tag is
    /// never returned. Fails with [`ErrorKind::NotFound`] when nothing matches.
    pub async fn find_one_document(
        &self,
        collection: &str,
        query: &Query,
        fields: Option<&Document>,
    ) -> PersistResult<Document> {
        self.find_one_document_with(collection, query, fields, Ok).await
    }

    pub async fn find_one_document_with<T, F>(
        &self,
        collection: &str,
        query: &Query,
        fields: Option<&Document>,
        map: F,
    ) -> PersistResult<T>
    where
        F: FnOnce(Document) -> PersistResult<T>,
    {
        let projection = self.hide_tag(fields);
        let found = self
            .inner
            .driver
            .find_one(collection, query.as_document(), Some(&projection))
            .await?;

        match found {
            Some(document) => map(self.strip_tag(document)),
            None => {
                log::error!("Document not found in {} for {}", collection, query);
                Err(PersistError::new(
                    &format!("Document not found in {}", collection),
                    ErrorKind::NotFound,
                ))
            }
        }
    }

    /// Applies `partial` to the first document matching `query`.
    ///
    /// Non-null fields are set, null fields are unset, the identifier and
    /// the creation field are never touched and the schema tag is bumped to
    /// the current version. Fails with [`ErrorKind::NotFound`] when nothing
    /// matches.
    pub async fn update_one_document(
        &self,
        collection: &str,
        query: &Query,
        partial: Document,
    ) -> PersistResult<()> {
        let version = self.config().schema_version().to_string();
        self.write_one_document(collection, query, partial, &version, false)
            .await
            .map(|_| ())
    }

    /// Updates one document and tags it with `version` instead of the
    /// configured schema version.
    pub(crate) async fn update_one_document_at(
        &self,
        collection: &str,
        query: &Query,
        partial: Document,
        version: &str,
    ) -> PersistResult<()> {
        self.write_one_document(collection, query, partial, version, false)
            .await
            .map(|_| ())
    }

    /// Like [`update_one_document`](Self::update_one_document) but inserts
    /// a document when nothing matches.
    ///
    /// Returns the new identifier when a document was inserted and `None`
    /// when an existing one was modified. Fails with [`ErrorKind::NotAdded`]
    /// when neither happened.
    pub async fn upsert_one_document(
        &self,
        collection: &str,
        query: &Query,
        partial: Document,
    ) -> PersistResult<Option<Bson>> {
        let version = self.config().schema_version().to_string();
        self.write_one_document(collection, query, partial, &version, true)
            .await
    }

    async fn write_one_document(
        &self,
        collection: &str,
        query: &Query,
        partial: Document,
        version: &str,
        upsert: bool,
    ) -> PersistResult<Option<Bson>> {
        let update = self.to_update_expression(partial, version);
        let result = self
            .inner
            .driver
            .update_with_options(
                collection,
                query.as_document(),
                &update,
                &UpdateOptions::new(false, upsert),
            )
            .await?;

        if !upsert {
            if result.matched_count == 0 {
                log::error!("Document not found to update in {} for {}", collection, query);
                return Err(PersistError::new(
                    &format!("Document not found to update in {}", collection),
                    ErrorKind::NotFound,
                ));
            }
            return Ok(None);
        }

        match result.upserted_id {
            Some(id) => Ok(Some(id)),
            None if result.modified_count == 1 => Ok(None),
            None => {
                log::error!("Document not added to {} for {}", collection, query);
                Err(PersistError::new(
                    &format!("Document not added to {}", collection),
                    ErrorKind::NotAdded,
                ))
            }
        }
    }

    /// Translates a partial document into a `$set` / `$unset` expression.
    pub(crate) fn to_update_expression(&self, partial: Document, version: &str) -> Document {
        let config = self.config();
        let mut set = Document::new();
        let mut unset = Document::new();

        for (field, value) in partial {
            if field == DOC_ID
                || field == config.creation_time_field()
                || field == config.schema_tag_field()
            {
                continue;
            }
            match value {
                Bson::Null => {
                    unset.insert(field, "");
                }
                value => {
                    set.insert(field, value);
                }
            }
        }
        set.insert(config.schema_tag_field(), version);

        let mut update = Document::new();
        update.insert(OP_SET, set);
        if !unset.is_empty() {
            update.insert(OP_UNSET, unset);
        }
        update
    }

    /// Removes the single document matching `query`.
    ///
    /// Fails with [`ErrorKind::NotFound`] unless exactly one was removed.
    pub async fn delete_one_document(&self, collection: &str, query: &Query) -> PersistResult<()> {
        let result = self
            .inner
            .driver
            .remove_one(collection, query.as_document())
            .await?;
        if result.removed_count != 1 {
            log::error!("Document not found to delete in {} for {}", collection, query);
            return Err(PersistError::new(
                &format!("Document not found to delete in {}", collection),
                ErrorKind::NotFound,
            ));
        }
        Ok(())
    }

    /// Removes every document matching `query` and returns how many.
    ///
    /// Fails with [`ErrorKind::NotFound`] when nothing was removed.
    pub async fn delete_documents(&self, collection: &str, query: &Query) -> PersistResult<u64> {
        let result = self
            .inner
            .driver
            .remove_many(collection, query.as_document())
            .await?;
        if result.removed_count < 1 {
            log::error!("No document found to delete in {} for {}", collection, query);
            return Err(PersistError::new(
                &format!("No document found to delete in {}", collection),
                ErrorKind::NotFound,
            ));
        }
        Ok(result.removed_count)
    }

    /// Migrates every legacy document of `collection` to `version` through
    /// the model `T`, and waits for the run to finish.
    ///
    /// Succeeds immediately when no legacy document exists, so running it
    /// again after a success is a no-op.
    pub async fn migrate_collection<T: SchemaModel>(
        &self,
        collection: &str,
        version: &str,
    ) -> PersistResult<MigrationOutcome> {
        self.start_migration::<T>(collection, version)
            .await?
            .wait()
            .await
    }

    /// Starts a migration in the background and returns its handle.
    ///
    /// Must be called within a tokio runtime. Fails with
    /// [`ErrorKind::MigrationInProgress`] while another run of this
    /// repository migrates the same collection.
    pub async fn start_migration<T: SchemaModel>(
        &self,
        collection: &str,
        version: &str,
    ) -> PersistResult<MigrationHandle> {
        MigrationRun::<T>::start(self.clone(), collection, version).await
    }

    /// Bumps the schema tag of every legacy document to `version` in a
    /// single multi-document update, leaving content untouched.
    pub async fn migrate_schema_version_on_collection_to(
        &self,
        version: &str,
        collection: &str,
    ) -> PersistResult<UpdateResult> {
        let tag_field = self.config().schema_tag_field();
        let mut set = Document::new();
        set.insert(tag_field, version);
        let mut update = Document::new();
        update.insert(OP_SET, set);

        self.inner
            .driver
            .update_with_options(collection, &legacy_filter(tag_field, version), &update, &multi())
            .await
    }

    /// Applies a raw update expression to every document matching `query`.
    pub async fn update_collection(
        &self,
        collection: &str,
        query: &Query,
        update: &Document,
    ) -> PersistResult<UpdateResult> {
        self.inner
            .driver
            .update_with_options(collection, query.as_document(), update, &multi())
            .await
    }

    /// Pages over the elements of a nested array.
    ///
    /// `element_path` names the array (possibly nested in other arrays);
    /// every element is unwound into its own row so `query` and `order`
    /// apply per element. The page carries the extracted elements.
    #[allow(clippy::too_many_arguments)]
    pub async fn aggregate_page_object(
        &self,
        collection: &str,
        query: &Query,
        order: &SortSpec,
        offset: u64,
        limit: u64,
        element_path: &str,
        result_key: &str,
    ) -> PersistResult<Page<Bson>> {
        self.aggregate_page_object_with(
            collection,
            query,
            order,
            offset,
            limit,
            element_path,
            result_key,
            Ok,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn aggregate_page_object_with<T, F>(
        &self,
        collection: &str,
        query: &Query,
        order: &SortSpec,
        offset: u64,
        limit: u64,
        element_path: &str,
        result_key: &str,
        map: F,
    ) -> PersistResult<Page<T>>
    where
        F: FnMut(Bson) -> PersistResult<T>,
    {
        let base = AggregationBuilder::new()
            .unwind_path(element_path)
            .match_query(query);

        let total = self.aggregate_count(collection, base.clone().count().build()).await?;
        if total == 0 || total < offset {
            return Ok(Page::empty(offset, total, result_key));
        }

        let pipeline = base.sort(order, offset, limit).build();
        let rows: Vec<Document> = self
            .inner
            .driver
            .aggregate(collection, pipeline)
            .await?
            .try_collect()
            .await?;

        let segments = element_path_segments(element_path);
        let elements: Vec<Bson> = rows
            .into_iter()
            .filter_map(|row| self.extract_element(row, &segments))
            .collect();

        Page::new(offset, total, result_key, elements).try_map(map)
    }

    async fn aggregate_count(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> PersistResult<u64> {
        let rows: Vec<Document> = self
            .inner
            .driver
            .aggregate(collection, pipeline)
            .await?
            .try_collect()
            .await?;

        match rows.first().and_then(|row| row.get(COUNT_FIELD)) {
            None => Ok(0),
            Some(count) => as_i64(count).map(|count| count.max(0) as u64).ok_or_else(|| {
                log::error!("Aggregation count is not a number: {}", count);
                PersistError::new(
                    &format!("Aggregation count is not a number: {}", count),
                    ErrorKind::DriverFailure,
                )
            }),
        }
    }

    fn extract_element(&self, row: Document, segments: &[&str]) -> Option<Bson> {
        if segments.is_empty() {
            return Some(Bson::Document(self.strip_tag(row)));
        }
        let mut current = Bson::Document(row);
        for segment in segments {
            current = match current {
                Bson::Document(mut document) => document.remove(*segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Parses sort tokens, see [`query_param_to_sort`](super::query_param_to_sort).
    pub fn query_param_to_sort<I, S>(
        tokens: I,
        error_code_prefix: &str,
        key_validator: Option<&dyn Fn(&str) -> bool>,
    ) -> PersistResult<SortSpec>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        super::query_param_to_sort(tokens, error_code_prefix, key_validator)
    }

    /// A projection equivalent to `fields` that never selects the schema tag.
    fn hide_tag(&self, fields: Option<&Document>) -> Document {
        let tag_field = self.config().schema_tag_field();
        match fields {
            Some(fields) if is_inclusion_projection(fields) => {
                let mut projection = fields.clone();
                projection.remove(tag_field);
                if is_inclusion_projection(&projection) {
                    projection
                } else {
                    let mut id_only = Document::new();
                    id_only.insert(DOC_ID, 1);
                    id_only
                }
            }
            Some(fields) => {
                let mut projection = fields.clone();
                projection.insert(tag_field, 0);
                projection
            }
            None => {
                let mut projection = Document::new();
                projection.insert(tag_field, 0);
                projection
            }
        }
    }

    fn strip_tag(&self, mut document: Document) -> Document {
        document.remove(self.config().schema_tag_field());
        document
    }
}
