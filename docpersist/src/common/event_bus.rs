use crate::common::MIGRATION_EVENT;
use crate::errors::{ErrorKind, PersistError, PersistResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Broadcasts events of type `E` to registered listeners of type `L`.
///
/// A thin, cloneable wrapper over a `basu` event bus bound to a single event
/// channel. Publishing with no registered listener is a cheap no-op, so
/// emitters can publish unconditionally.
///
/// # Example
///
/// ```ignore
/// let bus: PersistEventBus<MigrationEventInfo, MigrationEventListener> = PersistEventBus::new();
/// let subscriber = bus.register(listener)?;
/// bus.publish(event)?;
/// bus.deregister(subscriber)?;
/// ```
pub struct PersistEventBus<E, L> {
    event_bus: Arc<EventBus<E>>,
    listener: PhantomData<L>,
}

impl<E, L> Clone for PersistEventBus<E, L> {
    fn clone(&self) -> Self {
        PersistEventBus {
            event_bus: self.event_bus.clone(),
            listener: PhantomData,
        }
    }
}

impl<E, L> Default for PersistEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> PersistEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        PersistEventBus {
            event_bus: Arc::new(EventBus::new()),
            listener: PhantomData,
        }
    }

    /// Registers a listener and returns the reference needed to remove it.
    pub fn register(&self, listener: L) -> PersistResult<SubscriberRef> {
        self.event_bus
            .subscribe(MIGRATION_EVENT, Box::new(listener))
            .map(SubscriberRef::new)
            .map_err(to_persist_error)
    }

    /// Removes a previously registered listener.
    pub fn deregister(&self, subscriber: SubscriberRef) -> PersistResult<()> {
        self.event_bus
            .unsubscribe(MIGRATION_EVENT, &subscriber.inner)
            .map_err(to_persist_error)
    }

    /// Publishes an event to every registered listener.
    pub fn publish(&self, event: E) -> PersistResult<()> {
        if !self.has_listeners() {
            return Ok(());
        }
        self.event_bus
            .publish(MIGRATION_EVENT, &Event::new(event))
            .map_err(to_persist_error)
    }

    /// Removes every registered listener.
    pub fn close(&self) -> PersistResult<()> {
        self.event_bus.clear().map_err(to_persist_error)
    }

    pub fn has_listeners(&self) -> bool {
        match self.event_bus.get_handler_count(MIGRATION_EVENT) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Failed to count event listeners: {}", e);
                false
            }
        }
    }
}

/// Handle returned by [`PersistEventBus::register`], used to deregister.
pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub fn new(inner: HandlerId) -> Self {
        SubscriberRef { inner }
    }
}

fn to_persist_error(e: BasuError) -> PersistError {
    match e {
        BasuError::EventTypeNotFOUND => PersistError::new(
            "No listener has been registered for migration events",
            ErrorKind::EventError,
        ),
        BasuError::MutexPoisoned => PersistError::new(
            "Event bus lock poisoned",
            ErrorKind::EventError,
        ),
        BasuError::HandlerError(e) => PersistError::new(
            &format!("Event listener failed: {}", e),
            ErrorKind::EventError,
        ),
    }
}
