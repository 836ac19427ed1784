use bson::{doc, Document};
use docpersist::errors::PersistResult;
use docpersist::query::{Query, QueryBuilder};
use docpersist::store::FindOptions;
use docpersist_int_test::test_util::{run_test, TestContext};

async fn names(ctx: &TestContext, query: &Query) -> PersistResult<Vec<String>> {
    let documents = ctx
        .repository()
        .find_documents("people", query, &FindOptions::new())
        .await?;
    Ok(documents
        .iter()
        .filter_map(|d| d.get_str("name").ok().map(str::to_string))
        .collect())
}

async fn seed_people(ctx: &TestContext) -> PersistResult<()> {
    let people: Vec<Document> = vec![
        doc! { "name": "abc", "age": 20, "nick": "al", "tags": ["red", "Blue"],
               "pets": [{ "kind": "dog", "name": "Rex" }, { "kind": "cat", "name": "Tom" }] },
        doc! { "name": "xABCx", "age": 35, "nick": null, "tags": ["green"],
               "pets": [{ "kind": "Dog", "name": "Fido" }] },
        doc! { "name": "zed", "age": 50, "tags": ["blue", "green"] },
    ];
    for person in people {
        ctx.repository().store_one_document("people", person).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_delimited_value_is_case_insensitive_regex() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new().with_eq_or_regex("name", Some("/abc/")).build();
        assert_eq!(query.as_document(), &doc! { "name": { "$regex": "abc", "$options": "i" } });
        assert_eq!(names(&ctx, &query).await?, vec!["abc", "xABCx"]);

        let query = QueryBuilder::new().with_eq_or_regex("name", Some("abc")).build();
        assert_eq!(query.as_document(), &doc! { "name": "abc" });
        assert_eq!(names(&ctx, &query).await?, vec!["abc"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_explicit_null_matches_missing_and_null() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new().with::<&str>("nick", None).build();
        assert_eq!(query.as_document(), &doc! { "nick": null });
        assert_eq!(names(&ctx, &query).await?, vec!["xABCx", "zed"]);

        let query = QueryBuilder::new().with_exist("nick", Some(true)).build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc"]);

        let query = QueryBuilder::new().with_no_exist_null_eq_or_regex("nick", None).build();
        assert_eq!(names(&ctx, &query).await?, vec!["xABCx", "zed"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_absent_values_are_no_ops() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new()
            .with_regex("name", None)
            .with_eq_or_regex("nick", None)
            .with_exist("age", None)
            .with_range::<i32, i32>("age", None, None)
            .with_regex_all("tags", Vec::<String>::new())
            .build();
        assert!(query.is_empty());
        assert_eq!(names(&ctx, &query).await?.len(), 3);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_range_is_inclusive() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new().with_range("age", Some(20), Some(35)).build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc", "xABCx"]);

        let query = QueryBuilder::new().with_range::<i32, i32>("age", None, Some(20)).build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc"]);

        let query = QueryBuilder::new().with_range::<i32, i32>("age", Some(36), None).build();
        assert_eq!(names(&ctx, &query).await?, vec!["zed"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_regex_all_requires_every_pattern() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new().with_regex_all("tags", ["BLUE", "gre"]).build();
        assert_eq!(names(&ctx, &query).await?, vec!["zed"]);

        let query = QueryBuilder::new().with_regex_all("tags", ["blue"]).build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc", "zed"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_eq_or_regex_all_mixes_exact_and_regex() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        // "Blue" only matches exactly, "/^gr/" matches case-insensitively
        let query = QueryBuilder::new().with_eq_or_regex_all("tags", ["blue", "/^GR/"]).build();
        assert_eq!(names(&ctx, &query).await?, vec!["zed"]);

        let query = QueryBuilder::new().with_eq_or_regex_all("tags", ["Blue"]).build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_element_eq_or_regex_matches_sub_field() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let query = QueryBuilder::new()
            .with_element_eq_or_regex("pets", "kind", ["/dog/"])
            .build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc", "xABCx"]);

        let query = QueryBuilder::new()
            .with_element_eq_or_regex("pets", "kind", ["dog", "cat"])
            .build();
        assert_eq!(names(&ctx, &query).await?, vec!["abc"]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_built_query_is_not_affected_by_later_calls() {
    run_test(|ctx| async move {
        seed_people(&ctx).await?;

        let builder = QueryBuilder::new().with_range("age", Some(30), None::<i32>);
        let first = builder.build();
        let builder = builder.with_eq_or_regex("name", Some("zed"));
        let second = builder.build();

        assert_eq!(names(&ctx, &first).await?, vec!["xABCx", "zed"]);
        assert_eq!(names(&ctx, &second).await?, vec!["zed"]);
        Ok(())
    })
    .await
}
