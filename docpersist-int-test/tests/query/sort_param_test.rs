use bson::doc;
use docpersist::common::SortOrder;
use docpersist::errors::ErrorKind;
use docpersist::query::Query;
use docpersist::repository::{query_param_to_sort, Repository};
use docpersist::store::FindOptions;
use docpersist_int_test::test_util::run_test;

#[test]
fn test_duplicate_field_reports_index_and_name() {
    let error = query_param_to_sort([Some("+a"), Some("-b"), Some("a")], "sort", None).unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::BadQuery);
    assert_eq!(error.code(), Some("sort[2].a"));
}

#[test]
fn test_missing_token_reports_index() {
    let error = query_param_to_sort([Some("name"), None, Some("age")], "order", None).unwrap_err();
    assert_eq!(error.kind(), &ErrorKind::BadQuery);
    assert_eq!(error.code(), Some("order[1]"));
}

#[test]
fn test_rejected_key_reports_field() {
    let allowed = |field: &str| ["name", "age"].contains(&field);
    let error = Repository::query_param_to_sort(
        vec![Some("name".to_string()), Some("-salary".to_string())],
        "sort",
        Some(&allowed),
    )
    .unwrap_err();
    assert_eq!(error.code(), Some("sort[1].salary"));
}

#[test]
fn test_prefixes_and_whitespace() {
    let sort = query_param_to_sort([Some(" -age "), Some("+ name"), Some("city")], "sort", None).unwrap();
    assert_eq!(
        sort.sorting_order(),
        &[
            ("age".to_string(), SortOrder::Descending),
            ("name".to_string(), SortOrder::Ascending),
            ("city".to_string(), SortOrder::Ascending),
        ]
    );
    assert_eq!(sort.to_string(), "[-age, +name, +city]");
}

#[tokio::test]
async fn test_parsed_sort_orders_search_results() {
    run_test(|ctx| async move {
        let repository = ctx.repository();
        for (name, age) in [("b", 30), ("a", 30), ("c", 20)] {
            repository
                .store_one_document("people", doc! { "name": name, "age": age })
                .await?;
        }

        let sort = query_param_to_sort([Some("-age"), Some("name")], "sort", None)?;
        let page = repository
            .search_page_object("people", &Query::all(), &FindOptions::new().sort(sort), "people")
            .await?;
        let names: Vec<&str> = page
            .items()
            .iter()
            .filter_map(|d| d.get_str("name").ok())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        Ok(())
    })
    .await
}
