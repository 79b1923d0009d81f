use serde::{Deserialize, Serialize};
use tracing::error;

use super::clause::{
    column_alias, column_expression, escape_like, render_joins, render_where, BindValue, Join,
    Predicate, SqlQuery,
};
use crate::db::{DataSource, QueryError};
use crate::model::{RawRow, SortDirection, DEFAULT_PAGE_LENGTH};

/// Which of the three statements failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueryStage {
    Results,
    CountTotal,
    CountFiltered,
}

impl QueryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStage::Results => "results",
            QueryStage::CountTotal => "count_total",
            QueryStage::CountFiltered => "count_filtered",
        }
    }
}

/// A query that failed and was degraded to an empty result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFailure {
    pub stage: QueryStage,
    pub message: String,
}

/// Filtered, searched, ordered and paginated SELECT over one table, plus
/// the two COUNT statements a grid needs.
///
/// Configuration calls can come in any order; nothing is rendered until one
/// of the `build_*`, `get_*` or `count_*` methods runs.
///
/// `get_results` and the `count_*` methods never fail: a database error is
/// logged, recorded in [`QueryBuilder::failures`] and turned into an empty
/// result. The `try_*` variants return the error instead.
pub struct QueryBuilder<'a> {
    source: &'a dyn DataSource,
    table: String,
    columns: Vec<String>,
    searchable: Vec<String>,
    index_column: String,
    where_conditions: Vec<Predicate>,
    joins: Vec<Join>,
    search_value: String,
    ordering: Option<(String, SortDirection)>,
    start: i64,
    length: i64,
    failures: Vec<QueryFailure>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(source: &'a dyn DataSource, table: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
            columns: Vec::new(),
            searchable: Vec::new(),
            index_column: "id".to_string(),
            where_conditions: Vec::new(),
            joins: Vec::new(),
            search_value: String::new(),
            ordering: None,
            start: 0,
            length: DEFAULT_PAGE_LENGTH,
            failures: Vec::new(),
        }
    }

    pub fn set_columns(&mut self, columns: Vec<String>) -> &mut Self {
        self.columns = columns;
        self
    }

    pub fn set_searchable_columns(&mut self, columns: Vec<String>) -> &mut Self {
        self.searchable = columns;
        self
    }

    pub fn set_index_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.index_column = column.into();
        self
    }

    pub fn set_where_conditions(&mut self, conditions: Vec<Predicate>) -> &mut Self {
        self.where_conditions = conditions;
        self
    }

    pub fn add_where(&mut self, condition: Predicate) -> &mut Self {
        self.where_conditions.push(condition);
        self
    }

    pub fn set_joins(&mut self, joins: Vec<Join>) -> &mut Self {
        self.joins = joins;
        self
    }

    pub fn add_join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// An empty string disables searching.
    pub fn set_search_value(&mut self, text: impl Into<String>) -> &mut Self {
        self.search_value = text.into();
        self
    }

    /// Sort by `column`. For `expr AS alias` columns the alias is what ends
    /// up in ORDER BY.
    pub fn set_ordering(
        &mut self,
        column: impl Into<String>,
        direction: impl Into<SortDirection>,
    ) -> &mut Self {
        self.ordering = Some((column.into(), direction.into()));
        self
    }

    pub fn set_pagination(&mut self, start: i64, length: i64) -> &mut Self {
        self.start = start.max(0);
        self.length = length.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn searchable_columns(&self) -> &[String] {
        &self.searchable
    }

    pub fn index_column(&self) -> &str {
        &self.index_column
    }

    pub fn where_conditions(&self) -> &[Predicate] {
        &self.where_conditions
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn search_value(&self) -> &str {
        &self.search_value
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn failures(&self) -> &[QueryFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<QueryFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn build_select(&self) -> SqlQuery {
        let mut binds = Vec::new();
        let where_sql = self.where_sql(true, &mut binds);
        binds.push(BindValue::Int(self.length));
        binds.push(BindValue::Int(self.start));
        SqlQuery {
            sql: format!(
                "SELECT {} {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
                self.columns.join(", "),
                self.from_sql(),
                where_sql,
                self.order_sql()
            ),
            binds,
        }
    }

    /// Base conditions and joins only; the search text is ignored.
    pub fn build_count_total(&self) -> SqlQuery {
        self.build_count(false)
    }

    pub fn build_count_filtered(&self) -> SqlQuery {
        self.build_count(true)
    }

    pub async fn try_results(&self) -> Result<Vec<RawRow>, QueryError> {
        self.source.fetch_rows(&self.build_select()).await
    }

    pub async fn try_count_total(&self) -> Result<i64, QueryError> {
        self.source.fetch_count(&self.build_count_total()).await
    }

    pub async fn try_count_filtered(&self) -> Result<i64, QueryError> {
        self.source.fetch_count(&self.build_count_filtered()).await
    }

    pub async fn get_results(&mut self) -> Vec<RawRow> {
        match self.try_results().await {
            Ok(rows) => rows,
            Err(err) => {
                self.record_failure(QueryStage::Results, &err);
                Vec::new()
            }
        }
    }

    pub async fn count_total(&mut self) -> i64 {
        match self.try_count_total().await {
            Ok(n) => n,
            Err(err) => {
                self.record_failure(QueryStage::CountTotal, &err);
                0
            }
        }
    }

    pub async fn count_filtered(&mut self) -> i64 {
        match self.try_count_filtered().await {
            Ok(n) => n,
            Err(err) => {
                self.record_failure(QueryStage::CountFiltered, &err);
                0
            }
        }
    }

    fn record_failure(&mut self, stage: QueryStage, err: &QueryError) {
        error!(?err, table = %self.table, stage = stage.as_str(), "query failed; degrading to empty result");
        self.failures.push(QueryFailure {
            stage,
            message: err.to_string(),
        });
    }

    fn build_count(&self, with_search: bool) -> SqlQuery {
        let mut binds = Vec::new();
        let where_sql = self.where_sql(with_search, &mut binds);
        SqlQuery {
            sql: format!(
                "SELECT COUNT(DISTINCT {}) {} WHERE {}",
                self.index_column,
                self.from_sql(),
                where_sql
            ),
            binds,
        }
    }

    fn from_sql(&self) -> String {
        let joins = render_joins(&self.joins);
        if joins.is_empty() {
            format!("FROM {}", self.table)
        } else {
            format!("FROM {} {}", self.table, joins)
        }
    }

    fn where_sql(&self, with_search: bool, binds: &mut Vec<BindValue>) -> String {
        let base = render_where(&self.where_conditions, binds);
        if !with_search {
            return base;
        }
        match self.search_sql(binds) {
            Some(search) => format!("{base} AND {search}"),
            None => base,
        }
    }

    fn search_sql(&self, binds: &mut Vec<BindValue>) -> Option<String> {
        if self.search_value.is_empty() || self.searchable.is_empty() {
            return None;
        }
        let pattern = format!("%{}%", escape_like(&self.search_value));
        let parts: Vec<String> = self
            .searchable
            .iter()
            .map(|column| {
                binds.push(BindValue::Text(pattern.clone()));
                format!("{} LIKE ? ESCAPE '\\'", column_expression(column))
            })
            .collect();
        Some(format!("({})", parts.join(" OR ")))
    }

    fn order_sql(&self) -> String {
        match &self.ordering {
            Some((column, direction)) => format!("{} {}", column_alias(column), direction.as_str()),
            None => format!("{} DESC", self.index_column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoDb;

    #[async_trait]
    impl DataSource for NoDb {
        async fn fetch_rows(&self, _query: &SqlQuery) -> Result<Vec<RawRow>, QueryError> {
            Err(QueryError::Backend("offline".into()))
        }

        async fn fetch_count(&self, _query: &SqlQuery) -> Result<i64, QueryError> {
            Err(QueryError::Backend("offline".into()))
        }
    }

    fn customers(source: &dyn DataSource) -> QueryBuilder<'_> {
        let mut qb = QueryBuilder::new(source, "app_customers c");
        qb.set_columns(vec!["c.id".into(), "c.name AS customer_name".into()])
            .set_searchable_columns(vec!["c.name AS customer_name".into(), "c.code".into()])
            .set_index_column("c.id");
        qb
    }

    #[test]
    fn default_select_orders_by_index_desc() {
        let qb = customers(&NoDb);
        let q = qb.build_select();
        assert_eq!(
            q.sql,
            "SELECT c.id, c.name AS customer_name FROM app_customers c WHERE 1=1 ORDER BY c.id DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(q.binds, vec![BindValue::Int(10), BindValue::Int(0)]);
    }

    #[test]
    fn search_is_bound_not_interpolated() {
        let mut qb = customers(&NoDb);
        qb.set_search_value("o'b%").add_where(Predicate::eq("c.status", "active"));
        let q = qb.build_select();
        assert!(!q.sql.contains("o'b"));
        assert!(q.sql.contains(
            "WHERE c.status = ? AND (c.name LIKE ? ESCAPE '\\' OR c.code LIKE ? ESCAPE '\\')"
        ));
        assert_eq!(
            q.binds,
            vec![
                BindValue::Text("active".into()),
                BindValue::Text("%o'b\\%%".into()),
                BindValue::Text("%o'b\\%%".into()),
                BindValue::Int(10),
                BindValue::Int(0),
            ]
        );
    }

    #[test]
    fn search_without_searchable_columns_is_ignored() {
        let mut qb = QueryBuilder::new(&NoDb, "t");
        qb.set_columns(vec!["id".into()]).set_search_value("x");
        assert!(!qb.build_select().sql.contains("LIKE"));
    }

    #[test]
    fn count_total_ignores_search() {
        let mut qb = customers(&NoDb);
        qb.set_search_value("bo")
            .set_joins(vec![Join::left("app_customer_branches b", "b.customer_id = c.id")]);
        let total = qb.build_count_total();
        assert_eq!(
            total.sql,
            "SELECT COUNT(DISTINCT c.id) FROM app_customers c LEFT JOIN app_customer_branches b ON b.customer_id = c.id WHERE 1=1"
        );
        assert!(total.binds.is_empty());
        let filtered = qb.build_count_filtered();
        assert!(filtered.sql.ends_with("ESCAPE '\\')"));
        assert_eq!(filtered.binds.len(), 2);
    }

    #[test]
    fn ordering_uses_alias_and_normalizes_direction() {
        let mut qb = customers(&NoDb);
        qb.set_ordering("c.name AS customer_name", "DeSc");
        assert!(qb.build_select().sql.contains("ORDER BY customer_name DESC"));
        qb.set_ordering("c.id", "sideways");
        assert!(qb.build_select().sql.contains("ORDER BY c.id ASC"));
    }

    #[test]
    fn pagination_is_coerced() {
        let mut qb = customers(&NoDb);
        qb.set_pagination(-5, 0);
        assert_eq!((qb.start(), qb.length()), (0, 1));
        qb.set_pagination(40, -10);
        assert_eq!((qb.start(), qb.length()), (40, 1));
    }

    #[tokio::test]
    async fn failures_degrade_and_are_recorded() {
        let mut qb = customers(&NoDb);
        assert!(qb.get_results().await.is_empty());
        assert_eq!(qb.count_total().await, 0);
        assert_eq!(qb.count_filtered().await, 0);
        let stages: Vec<_> = qb.failures().iter().map(|f| f.stage).collect();
        assert_eq!(
            stages,
            vec![QueryStage::Results, QueryStage::CountTotal, QueryStage::CountFiltered]
        );
        assert!(qb.try_results().await.is_err());
    }
}
