use bson::doc;
use docpersist::errors::ErrorKind;
use docpersist::migration::legacy_filter;
use docpersist::query::Query;
use docpersist::store::memory::OperationKind;
use docpersist::store::StoreDriver;
use docpersist_int_test::test_util::{
    create_test_context_with_version, legacy_customers, run_test, run_test_with, Customer, PaymentMethod,
    Wallet,
};

#[tokio::test]
async fn test_migrates_every_legacy_document() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;

        let outcome = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(outcome.migrated(), 3);
        assert_eq!(outcome.version(), "2.0");
        assert_eq!(ctx.store().operation_count(OperationKind::Update), 3);

        let documents = ctx.store().documents("customers");
        assert_eq!(
            documents[0],
            doc! { "_id": 1, "_schema": "2.0", "name": "Ann", "vip": false, "tags": [] }
        );
        assert_eq!(
            documents[1],
            doc! { "_id": 2, "_schema": "2.0", "name": "Ben", "email": "ben@example.com", "vip": false, "tags": [] }
        );
        assert_eq!(
            documents[2],
            doc! { "_id": 3, "_schema": "2.0", "name": "Cid", "vip": false, "tags": ["gold"] }
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_untagged_and_non_string_tags_are_legacy() {
    run_test(|ctx| async move {
        ctx.seed(
            "customers",
            vec![
                doc! { "_id": 1, "name": "a" },
                doc! { "_id": 2, "_schema": 1.5, "name": "b" },
                doc! { "_id": 3, "_schema": "2.0", "name": "c", "legacy": true },
            ],
        )
        .await?;

        let outcome = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(outcome.migrated(), 2);
        assert_eq!(
            ctx.schema_tags("customers"),
            vec![Some("2.0".to_string()), Some("2.0".to_string()), Some("2.0".to_string())]
        );
        // already current documents are left untouched
        assert_eq!(ctx.store().documents("customers")[2].get_bool("legacy").ok(), Some(true));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_rerun_is_a_no_op() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        ctx.store().clear_operations();

        let outcome = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(outcome.migrated(), 0);
        assert_eq!(ctx.store().operation_count(OperationKind::Count), 1);
        assert_eq!(ctx.store().operation_count(OperationKind::FindOne), 0);
        assert_eq!(ctx.store().operation_count(OperationKind::Update), 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_undecodable_document_stops_the_run() {
    run_test(|ctx| async move {
        ctx.seed(
            "customers",
            vec![
                doc! { "_id": 1, "_schema": "1.0", "name": "Ann" },
                doc! { "_id": 2, "_schema": "1.0", "name": 42 },
                doc! { "_id": 3, "_schema": "1.0", "name": "Cid" },
            ],
        )
        .await?;

        let error = ctx
            .repository()
            .migrate_collection::<Customer>("customers", "2.0")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::MigrationFailure);
        assert_eq!(error.root_cause().kind(), &ErrorKind::EncodingError);
        assert_eq!(
            ctx.schema_tags("customers"),
            vec![Some("2.0".to_string()), Some("1.0".to_string()), Some("1.0".to_string())]
        );

        // once fixed, the remaining documents migrate
        ctx.store()
            .update_with_options(
                "customers",
                &doc! { "_id": 2 },
                &doc! { "$set": { "name": "Ben" } },
                &docpersist::store::just_once(),
            )
            .await?;
        let outcome = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(outcome.migrated(), 2);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_concurrent_run_on_same_collection_is_rejected() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        let repository = ctx.repository();

        let running = repository.start_migration::<Customer>("customers", "2.0").await?;
        let error = repository
            .start_migration::<Customer>("customers", "2.0")
            .await
            .err()
            .map(|e| e.kind().clone());
        assert_eq!(error, Some(ErrorKind::MigrationInProgress));

        // other collections are not blocked
        let other = repository.migrate_collection::<Customer>("archive", "2.0").await?;
        assert_eq!(other.migrated(), 0);

        assert_eq!(running.wait().await?.migrated(), 3);
        let again = repository.migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(again.migrated(), 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_cancel_before_first_step() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;

        let handle = ctx.repository().start_migration::<Customer>("customers", "2.0").await?;
        handle.cancel();
        let error = handle.wait().await.unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::MigrationCancelled);
        assert_eq!(ctx.store().operation_count(OperationKind::Update), 0);

        let outcome = ctx.repository().migrate_collection::<Customer>("customers", "2.0").await?;
        assert_eq!(outcome.migrated(), 3);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_write_failure_aborts_with_driver_cause() {
    run_test(|ctx| async move {
        ctx.seed("customers", legacy_customers()).await?;
        ctx.store().fail_next(OperationKind::Update, "write conflict");

        let error = ctx
            .repository()
            .migrate_collection::<Customer>("customers", "2.0")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::MigrationFailure);
        assert_eq!(error.root_cause().kind(), &ErrorKind::DriverFailure);
        assert_eq!(error.root_cause().message(), "write conflict");
        assert_eq!(ctx.store().count("customers", &legacy_filter("_schema", "2.0")).await?, 3);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_invalid_subtypes_are_dropped() {
    run_test(|ctx| async move {
        ctx.seed(
            "wallets",
            vec![doc! {
                "_id": 1,
                "_schema": "1.0",
                "owner": "ann",
                "methods": [
                    { "type": "Card", "last4": "4242" },
                    { "type": "Cheque", "number": "0001" },
                    { "type": "Transfer", "iban": "DE00" }
                ]
            }],
        )
        .await?;

        ctx.repository().migrate_collection::<Wallet>("wallets", "2.0").await?;
        let wallet = ctx
            .repository()
            .find_one_document_with("wallets", &Query::by_id(1), None, |document| {
                Ok(bson::from_document::<Wallet>(document)?)
            })
            .await?;
        assert_eq!(
            wallet.methods,
            vec![
                PaymentMethod::Card { last4: "4242".into() },
                PaymentMethod::Transfer { iban: "DE00".into() },
            ]
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_bulk_tag_bump_leaves_content() {
    run_test_with(
        || create_test_context_with_version("2.0"),
        |ctx| async move {
            ctx.seed("customers", legacy_customers()).await?;

            let result = ctx
                .repository()
                .migrate_schema_version_on_collection_to("2.0", "customers")
                .await?;
            assert_eq!(result.matched_count, 3);
            assert_eq!(ctx.store().operation_count(OperationKind::Update), 1);

            let documents = ctx.store().documents("customers");
            assert_eq!(documents[0].get_str("fax").ok(), Some("555-0101"));
            assert!(ctx
                .schema_tags("customers")
                .iter()
                .all(|tag| tag.as_deref() == Some("2.0")));

            // new writes carry the configured version
            ctx.repository()
                .store_one_document("customers", doc! { "_id": 4, "name": "Dee" })
                .await?;
            assert_eq!(ctx.schema_tags("customers")[3].as_deref(), Some("2.0"));
            Ok(())
        },
    )
    .await
}

#[tokio::test]
async fn test_empty_target_version_is_rejected() {
    run_test(|ctx| async move {
        let error = ctx
            .repository()
            .migrate_collection::<Customer>("customers", "")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::MigrationFailure);
        Ok(())
    })
    .await
}
