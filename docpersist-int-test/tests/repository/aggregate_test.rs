use bson::{doc, Bson, Document};
use docpersist::common::{SortOrder, SortSpec};
use docpersist::errors::ErrorKind;
use docpersist::query::{Query, QueryBuilder};
use docpersist::store::memory::OperationKind;
use docpersist_int_test::test_util::{pet_owners, run_test};
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Pet {
    name: String,
    species: String,
    age: i32,
}

fn by_age_desc() -> SortSpec {
    SortSpec::new()
        .add("pets.age", SortOrder::Descending)
        .unwrap_or_default()
}

fn pet_name(value: &Bson) -> Option<&str> {
    value.as_document().and_then(|d| d.get_str("name").ok())
}

#[tokio::test]
async fn test_pages_over_unwound_elements() {
    run_test(|ctx| async move {
        ctx.seed("owners", pet_owners()).await?;

        let page = ctx
            .repository()
            .aggregate_page_object("owners", &Query::all(), &by_age_desc(), 0, 2, "pets", "pets")
            .await?;
        // owners with an empty or missing array contribute no element
        assert_eq!(page.total(), 3);
        let names: Vec<&str> = page.items().iter().filter_map(pet_name).collect();
        assert_eq!(names, vec!["Rex", "Kit"]);

        let page = ctx
            .repository()
            .aggregate_page_object("owners", &Query::all(), &by_age_desc(), 2, 2, "pets", "pets")
            .await?;
        let names: Vec<&str> = page.items().iter().filter_map(pet_name).collect();
        assert_eq!(names, vec!["Tom"]);
        assert_eq!(ctx.store().operation_count(OperationKind::Aggregate), 4);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_query_applies_per_element() {
    run_test(|ctx| async move {
        ctx.seed("owners", pet_owners()).await?;

        let cats = QueryBuilder::new().with_eq_or_regex("pets.species", Some("/CAT/")).build();
        let page = ctx
            .repository()
            .aggregate_page_object_with(
                "owners",
                &cats,
                &SortSpec::new(),
                0,
                0,
                "pets",
                "cats",
                |element| Ok(bson::from_bson::<Pet>(element)?),
            )
            .await?;
        assert_eq!(page.total(), 2);
        assert_eq!(
            page.items(),
            &[
                Pet { name: "Tom".into(), species: "cat".into(), age: 2 },
                Pet { name: "Kit".into(), species: "cat".into(), age: 4 },
            ]
        );
        assert_eq!(page.result_key(), "cats");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_zero_total_runs_only_the_count() {
    run_test(|ctx| async move {
        ctx.seed("owners", pet_owners()).await?;

        let fish = QueryBuilder::new().with("pets.species", Some("fish")).build();
        let page = ctx
            .repository()
            .aggregate_page_object("owners", &fish, &by_age_desc(), 0, 10, "pets", "pets")
            .await?;
        assert!(page.is_empty());
        assert_eq!(page.total(), 0);
        assert_eq!(ctx.store().operation_count(OperationKind::Aggregate), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_nested_element_path() {
    run_test(|ctx| async move {
        let shops: Vec<Document> = vec![doc! {
            "_id": 1,
            "_schema": "1.0",
            "orders": [
                { "no": 1, "items": [{ "sku": "a", "qty": 1 }, { "sku": "b", "qty": 5 }] },
                { "no": 2, "items": [{ "sku": "c", "qty": 3 }] }
            ]
        }];
        ctx.seed("shops", shops).await?;

        let sort = SortSpec::new()
            .add("orders.items.qty", SortOrder::Ascending)
            .unwrap_or_default();
        let page = ctx
            .repository()
            .aggregate_page_object("shops", &Query::all(), &sort, 0, 0, "orders.items", "items")
            .await?;
        assert_eq!(page.total(), 3);
        let skus: Vec<&str> = page
            .items()
            .iter()
            .filter_map(|item| item.as_document().and_then(|d| d.get_str("sku").ok()))
            .collect();
        assert_eq!(skus, vec!["a", "c", "b"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_aggregate_driver_failure() {
    run_test(|ctx| async move {
        ctx.seed("owners", pet_owners()).await?;
        ctx.store().fail_next(OperationKind::Aggregate, "cursor lost");

        let error = ctx
            .repository()
            .aggregate_page_object("owners", &Query::all(), &by_age_desc(), 0, 10, "pets", "pets")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::DriverFailure);
        Ok(())
    })
    .await
}
