use docpersist::migration::MigrationEvents;
use docpersist::store::memory::OperationKind;
use docpersist_int_test::test_util::{legacy_customers, run_test, Customer, EventRecorder};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_of_a_successful_run() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        let recorder = EventRecorder::new();
        ctx.repository().subscribe(recorder.listener())?;

        let handle = ctx.repository().start_migration::<Customer>("customers", "2.0").await?;
        let run_id = handle.run_id().to_string();
        handle.wait().await?;

        recorder.wait_for_terminal(Duration::from_secs(5));
        assert_eq!(
            recorder.event_types(),
            vec![
                MigrationEvents::Started { total: 3 },
                MigrationEvents::Progress { remaining: 3 },
                MigrationEvents::Progress { remaining: 2 },
                MigrationEvents::Progress { remaining: 1 },
                MigrationEvents::Completed { migrated: 3 },
            ]
        );
        assert!(recorder.run_ids().iter().all(|id| *id == run_id));
        Ok(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_of_a_failed_run() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        ctx.store().fail_next(OperationKind::FindOne, "connection reset");
        let recorder = EventRecorder::new();
        ctx.repository().subscribe(recorder.listener())?;

        let result = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await;
        assert!(result.is_err());

        recorder.wait_for_terminal(Duration::from_secs(5));
        let events = recorder.event_types();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], MigrationEvents::Failed { .. }));
        Ok(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_op_run_completes_immediately() {
    run_test(|ctx| async move {
        let recorder = EventRecorder::new();
        ctx.repository().subscribe(recorder.listener())?;

        ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;

        recorder.wait_for_terminal(Duration::from_secs(5));
        assert_eq!(
            recorder.event_types(),
            vec![
                MigrationEvents::Started { total: 0 },
                MigrationEvents::Completed { migrated: 0 },
            ]
        );
        Ok(())
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsubscribed_listener_hears_nothing() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        let recorder = EventRecorder::new();
        let subscriber = ctx.repository().subscribe(recorder.listener())?;
        ctx.repository().unsubscribe(subscriber)?;

        ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert!(recorder.event_types().is_empty());
        Ok(())
    })
    .await
}
