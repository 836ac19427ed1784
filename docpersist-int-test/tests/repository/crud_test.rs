use bson::{doc, Bson};
use docpersist::errors::ErrorKind;
use docpersist::query::{Query, QueryBuilder};
use docpersist::store::memory::OperationKind;
use docpersist_int_test::test_util::{run_test, Customer};

#[tokio::test]
async fn test_store_and_find_round_trip() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        let stored = repository
            .store_one_document("customers", doc! { "name": "Ann", "vip": true })
            .await?;
        let id = stored.get("_id").cloned().unwrap_or(Bson::Null);
        assert!(matches!(id, Bson::ObjectId(_)));
        assert!(!stored.contains_key("_schema"));

        let found = repository
            .find_one_document("customers", &Query::by_id(id.clone()), None)
            .await?;
        assert_eq!(found, stored);

        // the tag is stored but never read back
        let raw = ctx.store().documents("customers");
        assert_eq!(raw[0].get_str("_schema").ok(), Some("1.0"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_store_keeps_supplied_id_and_maps() {
    run_test(|ctx| async move {
        let customer = ctx
            .repository()
            .store_one_document_with(
                "customers",
                doc! { "_id": 7, "name": "Bo", "email": "bo@example.com" },
                |document| Ok(bson::from_document::<Customer>(document)?),
            )
            .await?;
        assert_eq!(customer.id, 7);
        assert_eq!(customer.email.as_deref(), Some("bo@example.com"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_find_one_with_projection_never_returns_tag() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        repository
            .store_one_document("customers", doc! { "_id": 1, "name": "Ann", "vip": true })
            .await?;

        let included = repository
            .find_one_document("customers", &Query::by_id(1), Some(&doc! { "name": 1, "_schema": 1 }))
            .await?;
        assert_eq!(included, doc! { "_id": 1, "name": "Ann" });

        let excluded = repository
            .find_one_document("customers", &Query::by_id(1), Some(&doc! { "vip": 0 }))
            .await?;
        assert_eq!(excluded, doc! { "_id": 1, "name": "Ann" });
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_find_one_missing_is_not_found() {
    run_test(|ctx| async move {
        let error = ctx
            .repository()
            .find_one_document("customers", &Query::by_id(99), None)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::NotFound);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_update_sets_unsets_and_protects_reserved_fields() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        ctx.seed(
            "customers",
            vec![doc! { "_id": 1, "_schema": "0.9", "_creationTs": 100, "name": "Ann", "fax": "555" }],
        )
        .await?;

        repository
            .update_one_document(
                "customers",
                &Query::by_id(1),
                doc! { "_id": 2, "_creationTs": 200, "name": "Anna", "fax": null, "vip": true },
            )
            .await?;

        let raw = ctx.store().documents("customers");
        assert_eq!(
            raw[0],
            doc! { "_id": 1, "_schema": "1.0", "_creationTs": 100, "name": "Anna", "vip": true }
        );
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_update_without_match_is_not_found() {
    run_test(|ctx| async move {
        let error = ctx
            .repository()
            .update_one_document("customers", &Query::by_id(1), doc! { "name": "x" })
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::NotFound);
        assert!(ctx.store().documents("customers").is_empty());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_upsert_inserts_then_modifies() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        let query = QueryBuilder::new().with("email", Some("cy@example.com")).build();

        let inserted = repository
            .upsert_one_document("customers", &query, doc! { "name": "Cy" })
            .await?;
        assert!(inserted.is_some());

        let modified = repository
            .upsert_one_document("customers", &query, doc! { "name": "Cyd" })
            .await?;
        assert_eq!(modified, None);

        let documents = ctx.store().documents("customers");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].get_str("name").ok(), Some("Cyd"));
        assert_eq!(documents[0].get_str("email").ok(), Some("cy@example.com"));
        assert_eq!(documents[0].get_str("_schema").ok(), Some("1.0"));

        // writing identical content modifies nothing
        let error = repository
            .upsert_one_document("customers", &query, doc! { "name": "Cyd" })
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::NotAdded);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_delete_one_and_many() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        ctx.seed(
            "customers",
            vec![
                doc! { "_id": 1, "vip": true },
                doc! { "_id": 2, "vip": true },
                doc! { "_id": 3, "vip": false },
            ],
        )
        .await?;

        repository.delete_one_document("customers", &Query::by_id(3)).await?;
        let error = repository
            .delete_one_document("customers", &Query::by_id(3))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::NotFound);

        let vip = QueryBuilder::new().with("vip", Some(true)).build();
        assert_eq!(repository.delete_documents("customers", &vip).await?, 2);
        let error = repository.delete_documents("customers", &vip).await.unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::NotFound);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_update_collection_applies_raw_expression() {
    run_test(|ctx| async move {
        ctx.seed(
            "customers",
            vec![
                doc! { "_id": 1, "tier": "free" },
                doc! { "_id": 2, "tier": "free" },
                doc! { "_id": 3, "tier": "paid" },
            ],
        )
        .await?;

        let query = QueryBuilder::new().with("tier", Some("free")).build();
        let result = ctx
            .repository()
            .update_collection("customers", &query, &doc! { "$set": { "tier": "trial" } })
            .await?;
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(ctx.store().operation_count(OperationKind::Update), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_driver_failure_propagates() {
    run_test(|ctx| async move {
        ctx.store().fail_next(OperationKind::Insert, "disk full");
        let error = ctx
            .repository()
            .store_one_document("customers", doc! { "name": "x" })
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::DriverFailure);
        assert!(error.message().contains("disk full"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_id_only_and_tag_only_projections_return_only_id() {
    run_test(|ctx| async move {
        ctx.repository()
            .store_one_document("customers", doc! { "_id": 1, "a": 1, "secret": "x" })
            .await?;

        let id_only = ctx
            .repository()
            .find_one_document("customers", &Query::by_id(1), Some(&doc! { "_id": 1 }))
            .await?;
        assert_eq!(id_only, doc! { "_id": 1 });

        let tag_only = ctx
            .repository()
            .find_one_document("customers", &Query::by_id(1), Some(&doc! { "_schema": 1 }))
            .await?;
        assert_eq!(tag_only, doc! { "_id": 1 });
        Ok(())
    })
    .await
}
