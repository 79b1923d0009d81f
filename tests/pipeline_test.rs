use serde_json::{json, Value};
use std::sync::Arc;

use datatable_bridge::model::{RawRow, RequestParams, ResultPage};
use datatable_bridge::present::{Cell, FormattedRow};
use datatable_bridge::query::result_key;
use datatable_bridge::table::{DataTable, TableModel};

struct PeopleTable;

impl TableModel for PeopleTable {
    fn entity(&self) -> &str {
        "people"
    }

    fn table_name(&self) -> &str {
        "people"
    }

    fn columns(&self) -> Vec<String> {
        vec!["id".into(), "name".into()]
    }

    fn searchable_columns(&self) -> Vec<String> {
        vec!["name".into()]
    }

    fn index_column(&self) -> &str {
        "id"
    }

    fn format_row(&self, row: &RawRow) -> FormattedRow {
        ["id", "name"]
            .iter()
            .map(|k| Cell::Value(row.get(*k).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Same table, second column computed with an inner `AS`.
struct CastTable;

const CAST_COLUMNS: [&str; 2] = ["id", "CAST(name AS TEXT)"];

impl TableModel for CastTable {
    fn entity(&self) -> &str {
        "people_cast"
    }

    fn table_name(&self) -> &str {
        "people"
    }

    fn columns(&self) -> Vec<String> {
        CAST_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn searchable_columns(&self) -> Vec<String> {
        vec![CAST_COLUMNS[1].to_string()]
    }

    fn index_column(&self) -> &str {
        "id"
    }

    fn format_row(&self, row: &RawRow) -> FormattedRow {
        CAST_COLUMNS
            .iter()
            .map(|c| Cell::Value(row.get(result_key(c)).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

async fn setup_pool(names: &[&str]) -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    for name in names {
        sqlx::query("INSERT INTO people (name) VALUES (?)")
            .bind(*name)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool
}

async fn people_table() -> DataTable<PeopleTable> {
    let pool = setup_pool(&["Alice", "Bob", "Carol"]).await;
    DataTable::new(PeopleTable, Arc::new(pool))
}

fn request(v: Value) -> RequestParams {
    RequestParams::from_value(v).unwrap()
}

fn ids(page: &ResultPage) -> Vec<i64> {
    page.data.iter().map(|r| r[0].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn search_scenario_matches_single_row() {
    let table = people_table().await;
    let page = table
        .get_data(&request(json!({
            "draw": 5, "start": 0, "length": 10, "search": {"value": "bo"}
        })))
        .await;
    assert_eq!(
        serde_json::to_value(&page).unwrap(),
        json!({"draw": 5, "recordsTotal": 3, "recordsFiltered": 1, "data": [[2, "Bob"]]})
    );
    assert!(!page.is_degraded());
}

#[tokio::test]
async fn ordered_offset_scenario_returns_middle_row() {
    let table = people_table().await;
    let page = table
        .get_data(&request(json!({
            "draw": 1, "start": 1, "length": 1,
            "search": {"value": ""},
            "order": [{"column": 0, "dir": "desc"}]
        })))
        .await;
    assert_eq!(
        serde_json::to_value(&page).unwrap(),
        json!({"draw": 1, "recordsTotal": 3, "recordsFiltered": 3, "data": [[2, "Bob"]]})
    );
}

#[tokio::test]
async fn sorting_by_name_both_directions() {
    let pool = setup_pool(&["Mallory", "Alice", "Zed"]).await;
    let table = DataTable::new(PeopleTable, Arc::new(pool));

    let asc = table
        .get_data(&request(json!({"order": [{"column": 1, "dir": "asc"}]})))
        .await;
    let names: Vec<&str> = asc.data.iter().map(|r| r[1].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Alice", "Mallory", "Zed"]);

    let desc = table
        .get_data(&request(json!({"order": [{"column": 1, "dir": "DESC"}]})))
        .await;
    let names: Vec<&str> = desc.data.iter().map(|r| r[1].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Zed", "Mallory", "Alice"]);
}

#[tokio::test]
async fn out_of_range_order_falls_back_to_index_desc() {
    let table = people_table().await;
    for column in [2, 99, -1] {
        let page = table
            .get_data(&request(json!({"order": [{"column": column, "dir": "asc"}]})))
            .await;
        assert_eq!(ids(&page), vec![3, 2, 1], "column {column}");
        assert!(!page.is_degraded());
    }
}

#[tokio::test]
async fn only_first_order_entry_is_used() {
    let table = people_table().await;
    let page = table
        .get_data(&request(json!({
            "order": [{"column": 0, "dir": "asc"}, {"column": 1, "dir": "desc"}]
        })))
        .await;
    assert_eq!(ids(&page), vec![1, 2, 3]);
}

#[tokio::test]
async fn empty_search_counts_match_and_filtered_never_exceeds_total() {
    let table = people_table().await;
    let page = table.get_data(&request(json!({"search": {"value": ""}}))).await;
    assert_eq!(page.records_filtered, page.records_total);
    assert_eq!(page.records_total, 3);

    for term in ["a", "o", "zzz", "%", "_", "\\", "Alice"] {
        let page = table
            .get_data(&request(json!({"search": {"value": term}})))
            .await;
        assert!(page.records_filtered <= page.records_total, "term {term}");
        assert_eq!(page.records_total, 3);
    }
}

#[tokio::test]
async fn like_wildcards_in_search_are_literal() {
    let pool = setup_pool(&["100% cotton", "100 cotton", "a_b", "ab"]).await;
    let table = DataTable::new(PeopleTable, Arc::new(pool));

    let page = table.get_data(&request(json!({"search": {"value": "%"}}))).await;
    assert_eq!(page.records_filtered, 1);
    assert_eq!(page.data[0][1], json!("100% cotton"));

    let page = table.get_data(&request(json!({"search": {"value": "a_b"}}))).await;
    assert_eq!(page.records_filtered, 1);
    assert_eq!(page.data[0][1], json!("a_b"));
}

#[tokio::test]
async fn draw_is_echoed_verbatim() {
    let table = people_table().await;
    for draw in [0, -7, 1, i64::MAX] {
        let page = table.get_data(&request(json!({"draw": draw}))).await;
        assert_eq!(page.draw, draw);
    }
}

#[tokio::test]
async fn page_length_never_exceeds_request_or_ceiling() {
    let names: Vec<String> = (0..130).map(|i| format!("person {i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let pool = setup_pool(&refs).await;
    let table = DataTable::new(PeopleTable, Arc::new(pool));

    for (length, expected) in [(5, 5), (100, 100), (500, 100), (0, 1), (-3, 1)] {
        let page = table.get_data(&request(json!({"length": length}))).await;
        assert_eq!(page.data.len(), expected, "length {length}");
        assert_eq!(page.records_total, 130);
    }

    let narrow = DataTable::new(PeopleTable, Arc::new(setup_pool(&refs).await)).with_max_length(25);
    let page = narrow.get_data(&request(json!({"length": 50}))).await;
    assert_eq!(page.data.len(), 25);
}

#[tokio::test]
async fn negative_start_is_treated_as_zero() {
    let table = people_table().await;
    let page = table
        .get_data(&request(json!({"start": -10, "order": [{"column": 0, "dir": "asc"}]})))
        .await;
    assert_eq!(ids(&page), vec![1, 2, 3]);
}

#[tokio::test]
async fn repeated_requests_are_identical() {
    let table = people_table().await;
    let req = request(json!({
        "draw": 9, "start": 0, "length": 2,
        "search": {"value": "l"},
        "order": [{"column": 1, "dir": "asc"}]
    }));
    let first = table.get_data(&req).await;
    let second = table.get_data(&req).await;
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn broken_query_degrades_to_empty_page() {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let table = DataTable::new(PeopleTable, Arc::new(pool));
    let page = table.get_data(&request(json!({"draw": 3}))).await;
    assert_eq!(
        serde_json::to_value(&page).unwrap(),
        json!({"draw": 3, "recordsTotal": 0, "recordsFiltered": 0, "data": []})
    );
    assert!(page.is_degraded());
    assert_eq!(page.failures.len(), 3);
}

#[tokio::test]
async fn computed_column_with_inner_cast_sorts_and_searches() {
    let pool = setup_pool(&["Alice", "Bob", "Carol"]).await;
    let table = DataTable::new(CastTable, Arc::new(pool));

    let page = table
        .get_data(&request(json!({"order": [{"column": 1, "dir": "asc"}]})))
        .await;
    assert!(!page.is_degraded(), "{:?}", page.failures);
    assert_eq!(
        page.data,
        vec![
            vec![json!(1), json!("Alice")],
            vec![json!(2), json!("Bob")],
            vec![json!(3), json!("Carol")],
        ]
    );

    let page = table
        .get_data(&request(json!({"search": {"value": "car"}})))
        .await;
    assert!(!page.is_degraded(), "{:?}", page.failures);
    assert_eq!(page.records_filtered, 1);
    assert_eq!(page.data, vec![vec![json!(3), json!("Carol")]]);
}
