use bson::{doc, Document};
use docpersist::errors::PersistResult;
use docpersist::migration::{
    MigrationEventInfo, MigrationEventListener, MigrationEvents, PolymorphicField, SchemaModel,
};
use docpersist::repository::{Repository, RepositoryBuilder};
use docpersist::store::memory::InMemoryStore;
use docpersist::store::StoreDriver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A repository wired to a fresh in-memory store.
///
/// The store handle shares its data and operation log with the one the
/// repository talks to, so tests can seed collections directly and assert
/// which driver calls were issued.
#[derive(Clone)]
pub struct TestContext {
    repository: Repository,
    store: InMemoryStore,
}

impl TestContext {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Inserts raw documents, bypassing the repository and its schema tag,
    /// then clears the operation log.
    pub async fn seed(&self, collection: &str, documents: Vec<Document>) -> PersistResult<()> {
        for document in documents {
            self.store.insert(collection, document).await?;
        }
        self.store.clear_operations();
        Ok(())
    }

    /// The schema tag of every document in insertion order, `None` when absent.
    pub fn schema_tags(&self, collection: &str) -> Vec<Option<String>> {
        let tag_field = self.repository.config().schema_tag_field().to_string();
        self.store
            .documents(collection)
            .iter()
            .map(|document| document.get_str(&tag_field).ok().map(str::to_string))
            .collect()
    }
}

pub fn create_test_context() -> PersistResult<TestContext> {
    create_test_context_with_version("1.0")
}

pub fn create_test_context_with_version(version: &str) -> PersistResult<TestContext> {
    let store = InMemoryStore::new();
    let repository = RepositoryBuilder::new(Arc::new(store.clone()))
        .schema_version(version)
        .build()?;
    Ok(TestContext { repository, store })
}

/// Runs `test` against a fresh context, cleans up, then fails the test
/// with the error the body returned, if any.
pub async fn run_test<F, Fut>(test: F)
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = PersistResult<()>>,
{
    run_test_with(create_test_context, test).await
}

pub async fn run_test_with<B, F, Fut>(before: B, test: F)
where
    B: FnOnce() -> PersistResult<TestContext>,
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = PersistResult<()>>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Test setup failed: {:?}", e),
    };
    let start_time = Instant::now();
    let result = test(ctx.clone()).await;
    cleanup(&ctx);
    log::debug!("Test finished in {:?}", start_time.elapsed());
    if let Err(e) = result {
        panic!("Test failed: {:?}", e);
    }
}

pub fn cleanup(ctx: &TestContext) {
    for collection in ctx.store.collection_names() {
        ctx.store.drop_collection(&collection);
    }
    ctx.store.clear_operations();
}

/// Collects migration events delivered to a registered listener.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<MigrationEventInfo>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        EventRecorder::default()
    }

    pub fn listener(&self) -> MigrationEventListener {
        let events = self.events.clone();
        MigrationEventListener::new(move |event: MigrationEventInfo| {
            events.lock().push(event);
            Ok(())
        })
    }

    pub fn event_types(&self) -> Vec<MigrationEvents> {
        self.events
            .lock()
            .iter()
            .map(|e| e.event_type().clone())
            .collect()
    }

    pub fn run_ids(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| e.run_id().to_string())
            .collect()
    }

    /// Blocks until a terminal event arrives or `timeout` elapses.
    pub fn wait_for_terminal(&self, timeout: Duration) {
        awaitility::at_most(timeout).until(|| {
            self.event_types()
                .last()
                .map(|event| event.is_terminal())
                .unwrap_or(false)
        });
    }
}

/// Current shape of a customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SchemaModel for Customer {}

/// Payment methods stored as internally tagged documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaymentMethod {
    Card { last4: String },
    Transfer { iban: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(rename = "_id")]
    pub id: i32,
    pub owner: String,
    #[serde(default)]
    pub methods: Vec<PaymentMethod>,
}

impl SchemaModel for Wallet {
    fn polymorphic_fields() -> Vec<PolymorphicField> {
        vec![PolymorphicField::new("methods", "type", ["Card", "Transfer"])]
    }
}

/// Three customers written by schema "1.0", one carrying a field the
/// current model no longer has.
pub fn legacy_customers() -> Vec<Document> {
    vec![
        doc! { "_id": 1, "_schema": "1.0", "name": "Ann", "fax": "555-0101" },
        doc! { "_id": 2, "_schema": "1.0", "name": "Ben", "email": "ben@example.com", "vip": null },
        doc! { "_id": 3, "_schema": "1.0", "name": "Cid", "tags": ["gold"] },
    ]
}

/// Owners with nested pets, for element paging.
pub fn pet_owners() -> Vec<Document> {
    vec![
        doc! { "_id": 1, "_schema": "1.0", "owner": "ann", "pets": [
            { "name": "Rex", "species": "dog", "age": 7 },
            { "name": "Tom", "species": "cat", "age": 2 }
        ] },
        doc! { "_id": 2, "_schema": "1.0", "owner": "ben", "pets": [
            { "name": "Kit", "species": "cat", "age": 4 }
        ] },
        doc! { "_id": 3, "_schema": "1.0", "owner": "cid", "pets": [] },
        doc! { "_id": 4, "_schema": "1.0", "owner": "dee" },
    ]
}
