//! Table models and the per-request pipeline that serves them.
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::db::DataSource;
use crate::hooks::{hook_name, HookChain, HookContext, HookStage};
use crate::model::{RawRow, RequestParams, ResultPage};
use crate::present::{render_row, FormattedRow};
use crate::query::{Join, Predicate, QueryBuilder};

/// Hard ceiling on rows per page, whatever the client asks for.
pub const MAX_PAGE_LENGTH: i64 = 100;

/// What an entity has to say about its own listing.
pub trait TableModel: Send + Sync {
    /// Logical entity name; scopes the hook names.
    fn entity(&self) -> &str;

    /// Physical table, optionally with an alias (`app_customers c`).
    fn table_name(&self) -> &str;

    /// Selected columns. Their position is what `order[].column` refers to.
    fn columns(&self) -> Vec<String>;

    fn searchable_columns(&self) -> Vec<String>;

    fn index_column(&self) -> &str;

    fn base_where(&self) -> Vec<Predicate> {
        Vec::new()
    }

    fn base_joins(&self) -> Vec<Join> {
        Vec::new()
    }

    /// Shape one fetched row into the cells the grid displays.
    fn format_row(&self, row: &RawRow) -> FormattedRow;
}

/// One entity's listing endpoint: the model, the database it reads from and
/// the hooks registered against it.
pub struct DataTable<M> {
    model: M,
    source: Arc<dyn DataSource>,
    hooks: HookChain,
    max_length: i64,
}

impl<M: TableModel> DataTable<M> {
    pub fn new(model: M, source: Arc<dyn DataSource>) -> Self {
        Self {
            model,
            source,
            hooks: HookChain::new(),
            max_length: MAX_PAGE_LENGTH,
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Lower the page ceiling. Values above [`MAX_PAGE_LENGTH`] are capped.
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length.clamp(1, MAX_PAGE_LENGTH);
        self
    }

    pub fn hooks_mut(&mut self) -> &mut HookChain {
        &mut self.hooks
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn max_length(&self) -> i64 {
        self.max_length
    }

    pub fn hook_name(&self, stage: HookStage) -> String {
        hook_name(self.model.entity(), stage)
    }

    /// Serve one grid request. Never fails: query errors degrade to an empty
    /// page and are listed in [`ResultPage::failures`].
    #[instrument(skip_all, fields(entity = %self.model.entity(), draw = request.draw))]
    pub async fn get_data(&self, request: &RequestParams) -> ResultPage {
        let ctx = HookContext {
            entity: self.model.entity(),
            request,
            model: &self.model,
        };

        self.trace_stage(HookStage::Columns);
        let columns = self.hooks.apply_columns(self.model.columns(), &ctx);

        let mut qb = QueryBuilder::new(self.source.as_ref(), self.model.table_name());
        qb.set_columns(columns.clone())
            .set_searchable_columns(self.model.searchable_columns())
            .set_index_column(self.model.index_column());

        self.trace_stage(HookStage::Where);
        let where_clauses = self.hooks.apply_where(self.model.base_where(), &ctx);
        self.trace_stage(HookStage::Joins);
        let joins = self.hooks.apply_joins(self.model.base_joins(), &ctx);
        qb.set_where_conditions(where_clauses).set_joins(joins);

        if !request.search_value().is_empty() {
            qb.set_search_value(request.search_value());
        }

        if let Some(order) = request.primary_order() {
            match usize::try_from(order.column)
                .ok()
                .and_then(|idx| columns.get(idx))
            {
                Some(column) => {
                    qb.set_ordering(column.clone(), order.direction());
                }
                None => warn!(
                    column = order.column,
                    available = columns.len(),
                    "order column out of range; keeping default ordering"
                ),
            }
        }

        let length = request.length.min(self.max_length);
        if length < request.length {
            debug!(requested = request.length, length, "page length capped");
        }
        qb.set_pagination(request.start, length);

        self.trace_stage(HookStage::QueryBuilder);
        self.hooks.apply_query_builder(&mut qb, &ctx);

        let rows = qb.get_results().await;
        if !rows.is_empty() {
            self.trace_stage(HookStage::RowData);
        }
        let data: Vec<_> = rows
            .iter()
            .map(|raw| {
                let formatted = self.model.format_row(raw);
                let formatted = self.hooks.apply_row_data(formatted, raw, &ctx);
                render_row(&formatted)
            })
            .collect();

        let records_total = qb.count_total().await;
        let records_filtered = qb.count_filtered().await;

        let page = ResultPage {
            draw: request.draw,
            records_total,
            records_filtered,
            data,
            failures: Vec::new(),
        };
        self.trace_stage(HookStage::Response);
        let mut page = self.hooks.apply_response(page, &ctx);
        page.failures.extend(qb.take_failures());
        debug!(
            rows = page.data.len(),
            records_total = page.records_total,
            records_filtered = page.records_filtered,
            degraded = page.is_degraded(),
            "page assembled"
        );
        page
    }

    fn trace_stage(&self, stage: HookStage) {
        if !self.hooks.is_empty() {
            debug!(hook = %self.hook_name(stage), hooks = self.hooks.len(), "applying hooks");
        }
    }
}

/// Object-safe view of a table endpoint, so tables of different models can
/// sit in one registry.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn entity(&self) -> &str;

    async fn page(&self, request: &RequestParams) -> ResultPage;
}

#[async_trait]
impl<M: TableModel + 'static> PageSource for DataTable<M> {
    fn entity(&self) -> &str {
        self.model.entity()
    }

    async fn page(&self, request: &RequestParams) -> ResultPage {
        self.get_data(request).await
    }
}
