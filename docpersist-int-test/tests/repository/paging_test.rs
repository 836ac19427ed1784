use bson::{doc, Document};
use docpersist::common::{SortOrder, SortSpec};
use docpersist::errors::PersistResult;
use docpersist::query::{Query, QueryBuilder};
use docpersist::store::memory::OperationKind;
use docpersist::store::{window, FindOptions};
use docpersist_int_test::test_util::{run_test, Customer, TestContext};

async fn seed_customers(ctx: &TestContext, count: i32) -> PersistResult<()> {
    let documents: Vec<Document> = (0..count)
        .map(|i| doc! { "_id": i, "_schema": "1.0", "name": format!("c{:02}", i), "vip": i % 2 == 0 })
        .collect();
    ctx.seed("customers", documents).await
}

fn by_name() -> SortSpec {
    SortSpec::new().add("name", SortOrder::Ascending).unwrap_or_default()
}

#[tokio::test]
async fn test_page_window_and_total() {
    run_test(|ctx| async move {
        seed_customers(&ctx, 10).await?;

        let page = ctx
            .repository()
            .search_page_object("customers", &Query::all(), &window(4, 3).sort(by_name()), "customers")
            .await?;
        assert_eq!(page.offset(), 4);
        assert_eq!(page.total(), 10);
        assert_eq!(page.len(), 3);
        let names: Vec<&str> = page.items().iter().filter_map(|d| d.get_str("name").ok()).collect();
        assert_eq!(names, vec!["c04", "c05", "c06"]);
        assert!(page.items().iter().all(|d| !d.contains_key("_schema")));

        assert_eq!(ctx.store().operation_count(OperationKind::Count), 1);
        assert_eq!(ctx.store().operation_count(OperationKind::Find), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_offset_past_total_skips_find() {
    run_test(|ctx| async move {
        seed_customers(&ctx, 3).await?;

        let page = ctx
            .repository()
            .search_page_object("customers", &Query::all(), &window(3, 10), "customers")
            .await?;
        assert!(page.is_empty());
        assert_eq!(page.total(), 3);
        assert_eq!(page.offset(), 3);
        assert_eq!(ctx.store().operation_count(OperationKind::Count), 1);
        assert_eq!(ctx.store().operation_count(OperationKind::Find), 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_empty_collection_page() {
    run_test(|ctx| async move {
        let page = ctx
            .repository()
            .search_page_object("customers", &Query::all(), &FindOptions::new(), "customers")
            .await?;
        assert_eq!(page.total(), 0);
        assert_eq!(page.to_document()?, doc! { "offset": 0i64, "total": 0i64 });
        assert_eq!(ctx.store().operation_count(OperationKind::Find), 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_page_filters_and_maps() {
    run_test(|ctx| async move {
        seed_customers(&ctx, 6).await?;

        let vip = QueryBuilder::new().with("vip", Some(true)).build();
        let page = ctx
            .repository()
            .search_page_object_with(
                "customers",
                &vip,
                &FindOptions::new().sort(by_name()).limit(2),
                "vips",
                |document| Ok(bson::from_document::<Customer>(document)?),
            )
            .await?;
        assert_eq!(page.total(), 3);
        assert_eq!(page.result_key(), "vips");
        let ids: Vec<i32> = page.items().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(page.items().iter().all(|c| c.vip));
        Ok(())
    })
    .await
}
