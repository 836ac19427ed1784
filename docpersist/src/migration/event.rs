use crate::common::PersistEventBus;
use crate::errors::PersistResult;
use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

/// Lifecycle events of a schema migration run.
///
/// A run publishes `Started` once, `Progress` before every step, then
/// exactly one of `Completed`, `Failed` or `Cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationEvents {
    Started { total: u64 },
    Progress { remaining: u64 },
    Completed { migrated: u64 },
    Failed { message: String },
    Cancelled { migrated: u64 },
}

impl MigrationEvents {
    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationEvents::Completed { .. }
                | MigrationEvents::Failed { .. }
                | MigrationEvents::Cancelled { .. }
        )
    }
}

/// A migration event together with the run it belongs to.
///
/// Cheap to clone; each listener receives its own copy.
#[derive(Clone)]
pub struct MigrationEventInfo {
    inner: Arc<MigrationEventInner>,
}

struct MigrationEventInner {
    run_id: String,
    collection: String,
    version: String,
    event_type: MigrationEvents,
    timestamp: DateTime<Utc>,
}

impl MigrationEventInfo {
    pub fn new(run_id: &str, collection: &str, version: &str, event_type: MigrationEvents) -> Self {
        MigrationEventInfo {
            inner: Arc::new(MigrationEventInner {
                run_id: run_id.to_string(),
                collection: collection.to_string(),
                version: version.to_string(),
                event_type,
                timestamp: Utc::now(),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn event_type(&self) -> &MigrationEvents {
        &self.inner.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.inner.timestamp
    }
}

impl Debug for MigrationEventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEventInfo")
            .field("run_id", &self.inner.run_id)
            .field("collection", &self.inner.collection)
            .field("version", &self.inner.version)
            .field("event_type", &self.inner.event_type)
            .field("timestamp", &self.inner.timestamp)
            .finish()
    }
}

/// Callback invoked for every migration event.
pub trait MigrationEventCallback: Send + Sync + Fn(MigrationEventInfo) -> PersistResult<()> {}

impl<F> MigrationEventCallback for F where
    F: Send + Sync + Fn(MigrationEventInfo) -> PersistResult<()>
{
}

/// Listener for migration events.
///
/// Register it with [`Repository::subscribe`](crate::repository::Repository::subscribe):
///
/// ```ignore
/// let subscriber = repository.subscribe(MigrationEventListener::new(|event| {
///     println!("{:?}", event.event_type());
///     Ok(())
/// }))?;
/// ```
///
/// An error returned by the callback is logged; it never fails the run.
#[derive(Clone)]
pub struct MigrationEventListener {
    on_event: Arc<dyn MigrationEventCallback>,
}

impl MigrationEventListener {
    pub fn new(on_event: impl MigrationEventCallback + 'static) -> Self {
        MigrationEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<MigrationEventInfo> for MigrationEventListener {
    fn handle(&self, event: &Event<MigrationEventInfo>) -> Result<(), BasuError> {
        match (self.on_event)(event.data.clone()) {
            Ok(_) => Ok(()),
            Err(e) => Err(BasuError::HandlerError(Error::from(e))),
        }
    }
}

impl Debug for MigrationEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEventListener").finish()
    }
}

/// The event bus carrying migration events.
pub type MigrationEventBus = PersistEventBus<MigrationEventInfo, MigrationEventListener>;
