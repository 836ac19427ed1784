use super::event::{MigrationEventInfo, MigrationEvents};
use super::lenient::{decode_lenient, DecodeOptions, PolymorphicField, SchemaModel};
use super::schema::{legacy_filter, stale_field_nulls};
use crate::common::DOC_ID;
use crate::errors::{ErrorKind, PersistError, PersistResult};
use crate::query::Query;
use crate::repository::Repository;
use bson::{Bson, Document};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Message driving the migration loop. Each step posts the next one.
#[derive(Debug)]
pub(crate) enum MigrationSignal {
    Continue(u64),
    Done,
    Abort(PersistError),
}

/// Result of a successful migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    collection: String,
    version: String,
    migrated: u64,
}

impl MigrationOutcome {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of documents rewritten by this run.
    pub fn migrated(&self) -> u64 {
        self.migrated
    }
}

/// Handle on a running migration.
///
/// Dropping the handle does not stop the run; call [`cancel`](Self::cancel)
/// for that. [`wait`](Self::wait) resolves once the run has finished and
/// its lease has been released.
pub struct MigrationHandle {
    run_id: String,
    collection: String,
    version: String,
    cancel: watch::Sender<bool>,
    outcome: oneshot::Receiver<PersistResult<MigrationOutcome>>,
}

impl MigrationHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Asks the run to stop before its next step.
    ///
    /// Documents already migrated stay migrated. The run then fails with
    /// [`ErrorKind::MigrationCancelled`].
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Waits for the run to finish.
    pub async fn wait(self) -> PersistResult<MigrationOutcome> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => {
                log::error!("Migration run {} ended without reporting an outcome", self.run_id);
                Err(PersistError::new(
                    &format!("Migration run {} ended without reporting an outcome", self.run_id),
                    ErrorKind::InternalError,
                ))
            }
        }
    }
}

/// One migration of a collection to a schema version.
///
/// Documents are processed one per step. A step finds a single legacy
/// document, decodes it leniently into `T`, re-encodes it and writes it
/// back with stale fields unset and the tag bumped. The loop is driven by
/// a capacity-one channel the consumer posts its own next signal to.
pub(crate) struct MigrationRun<T> {
    repository: Repository,
    run_id: String,
    collection: String,
    version: String,
    filter: Document,
    options: DecodeOptions,
    polymorphic_fields: Vec<PolymorphicField>,
    step_timeout: Option<Duration>,
    migrated: AtomicU64,
    model: PhantomData<fn() -> T>,
}

impl<T: SchemaModel> MigrationRun<T> {
    /// Counts the legacy documents and, when there are any, spawns the
    /// consumer task on the current tokio runtime.
    pub(crate) async fn start(
        repository: Repository,
        collection: &str,
        version: &str,
    ) -> PersistResult<MigrationHandle> {
        if version.is_empty() {
            log::error!("Target schema version cannot be empty");
            return Err(PersistError::new(
                "Target schema version cannot be empty",
                ErrorKind::MigrationFailure,
            ));
        }

        let run_id = Uuid::new_v4().to_string();
        let lease = repository.leases().acquire(collection, &run_id)?;

        let config = repository.config();
        let filter = legacy_filter(config.schema_tag_field(), version);
        let options = T::decode_options().unwrap_or(*config.decode_options());
        let step_timeout = config.migration_step_timeout();

        let run = MigrationRun::<T> {
            repository: repository.clone(),
            run_id: run_id.clone(),
            collection: collection.to_string(),
            version: version.to_string(),
            filter,
            options,
            polymorphic_fields: T::polymorphic_fields(),
            step_timeout,
            migrated: AtomicU64::new(0),
            model: PhantomData,
        };

        let total = repository.driver().count(collection, &run.filter).await?;
        log::info!(
            "Migrating {} legacy documents of {} to schema {} ({})",
            total,
            collection,
            version,
            run_id
        );

        let (cancel_sender, cancel_receiver) = watch::channel(false);
        let (outcome_sender, outcome_receiver) = oneshot::channel();
        let handle = MigrationHandle {
            run_id,
            collection: collection.to_string(),
            version: version.to_string(),
            cancel: cancel_sender,
            outcome: outcome_receiver,
        };

        run.publish(MigrationEvents::Started { total });

        if total == 0 {
            drop(lease);
            let result = Ok(());
            run.report(&result);
            let _ = outcome_sender.send(result.map(|_| run.outcome()));
            return Ok(handle);
        }

        let (signals, receiver) = mpsc::channel(1);
        signals
            .try_send(MigrationSignal::Continue(total))
            .map_err(|_| channel_closed(&run.run_id))?;

        tokio::spawn(async move {
            let result = run.drive(signals, receiver, cancel_receiver).await;
            drop(lease);
            run.report(&result);
            let _ = outcome_sender.send(result.map(|_| run.outcome()));
        });

        Ok(handle)
    }

    async fn drive(
        &self,
        signals: mpsc::Sender<MigrationSignal>,
        mut receiver: mpsc::Receiver<MigrationSignal>,
        cancel: watch::Receiver<bool>,
    ) -> PersistResult<()> {
        while let Some(signal) = receiver.recv().await {
            match signal {
                MigrationSignal::Continue(remaining) => {
                    if *cancel.borrow() {
                        log::warn!(
                            "Migration run {} cancelled with {} documents left",
                            self.run_id,
                            remaining
                        );
                        return Err(PersistError::new(
                            &format!(
                                "Migration of {} to schema {} was cancelled",
                                self.collection, self.version
                            ),
                            ErrorKind::MigrationCancelled,
                        ));
                    }

                    self.publish(MigrationEvents::Progress { remaining });
                    let next = match self.step_within_timeout().await {
                        Ok(true) => {
                            self.migrated.fetch_add(1, Ordering::SeqCst);
                            if remaining > 1 {
                                MigrationSignal::Continue(remaining - 1)
                            } else {
                                MigrationSignal::Done
                            }
                        }
                        Ok(false) => {
                            log::debug!(
                                "No legacy document left in {} with {} expected",
                                self.collection,
                                remaining
                            );
                            MigrationSignal::Done
                        }
                        Err(e) => MigrationSignal::Abort(e),
                    };

                    signals
                        .send(next)
                        .await
                        .map_err(|_| channel_closed(&self.run_id))?;
                }
                MigrationSignal::Done => return Ok(()),
                MigrationSignal::Abort(e) => return Err(e),
            }
        }
        Err(channel_closed(&self.run_id))
    }

    async fn step_within_timeout(&self) -> PersistResult<bool> {
        match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.step()).await {
                Ok(result) => result,
                Err(_) => {
                    log::error!(
                        "Migration step of {} timed out after {:?}",
                        self.collection,
                        limit
                    );
                    Err(PersistError::new(
                        &format!(
                            "Migration step of {} timed out after {:?}",
                            self.collection, limit
                        ),
                        ErrorKind::MigrationFailure,
                    ))
                }
            },
            None => self.step().await,
        }
    }

    /// Migrates one legacy document. Returns `false` when none is left.
    async fn step(&self) -> PersistResult<bool> {
        let driver = self.repository.driver();
        let legacy = driver
            .find_one(&self.collection, &self.filter, None)
            .await
            .map_err(|e| self.failure("could not read the next legacy document", None, e))?;
        let Some(legacy) = legacy else {
            return Ok(false);
        };

        let Some(id) = legacy.get(DOC_ID).cloned() else {
            return Err(self.failure(
                "legacy document has no identifier",
                None,
                PersistError::new("missing _id", ErrorKind::MigrationFailure),
            ));
        };
        log::debug!("Migrating document {} of {}", id, self.collection);

        let config = self.repository.config();
        let mut source = legacy;
        source.remove(config.schema_tag_field());

        let value: T = decode_lenient(&source, &self.options, &self.polymorphic_fields)
            .map_err(|e| self.failure("could not decode", Some(&id), e))?;
        let mut canonical = bson::to_document(&value)
            .map_err(|e| self.failure("could not encode", Some(&id), PersistError::from(e)))?;

        let nulls = stale_field_nulls(&source, &canonical, &[DOC_ID, config.creation_time_field()]);
        for (field, null) in nulls {
            canonical.insert(field, null);
        }
        canonical.remove(DOC_ID);

        self.repository
            .update_one_document_at(
                &self.collection,
                &Query::by_id(id.clone()),
                canonical,
                &self.version,
            )
            .await
            .map_err(|e| self.failure("could not update", Some(&id), e))?;
        Ok(true)
    }

    fn failure(&self, what: &str, id: Option<&Bson>, cause: PersistError) -> PersistError {
        let message = match id {
            Some(id) => format!(
                "Migration of {} to schema {} failed, {} document {}",
                self.collection, self.version, what, id
            ),
            None => format!(
                "Migration of {} to schema {} failed, {}",
                self.collection, self.version, what
            ),
        };
        log::error!("{}: {}", message, cause);
        PersistError::new_with_cause(&message, ErrorKind::MigrationFailure, cause)
    }

    fn outcome(&self) -> MigrationOutcome {
        MigrationOutcome {
            collection: self.collection.clone(),
            version: self.version.clone(),
            migrated: self.migrated.load(Ordering::SeqCst),
        }
    }

    fn report(&self, result: &PersistResult<()>) {
        let migrated = self.migrated.load(Ordering::SeqCst);
        match result {
            Ok(()) => {
                log::info!(
                    "Migrated {} documents of {} to schema {} ({})",
                    migrated,
                    self.collection,
                    self.version,
                    self.run_id
                );
                self.publish(MigrationEvents::Completed { migrated });
            }
            Err(e) if e.kind() == &ErrorKind::MigrationCancelled => {
                self.publish(MigrationEvents::Cancelled { migrated });
            }
            Err(e) => {
                self.publish(MigrationEvents::Failed {
                    message: e.message().to_string(),
                });
            }
        }
    }

    fn publish(&self, event: MigrationEvents) {
        let info = MigrationEventInfo::new(&self.run_id, &self.collection, &self.version, event);
        if let Err(e) = self.repository.event_bus().publish(info) {
            log::warn!("Migration event listener failed for run {}: {}", self.run_id, e);
        }
    }
}

fn channel_closed(run_id: &str) -> PersistError {
    log::error!("Migration channel of run {} closed unexpectedly", run_id);
    PersistError::new(
        &format!("Migration channel of run {} closed unexpectedly", run_id),
        ErrorKind::InternalError,
    )
}
