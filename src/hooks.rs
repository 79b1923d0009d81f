//! Extension points of the table pipeline.
//!
//! Each [`DataTable`](crate::table::DataTable) carries its own [`HookChain`]:
//! an ordered list of [`TableHook`] objects, applied in registration order at
//! six stages. Every stage receives the current value and returns the value
//! to continue with; the chain's final return is used as is, without any
//! validation of what a hook did with it.
//!
//! Access control is a separate concern ([`AccessPolicy`]) that callers check
//! before ever running the pipeline.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{RawRow, RequestParams, ResultPage};
use crate::present::FormattedRow;
use crate::query::{Join, Predicate, QueryBuilder};
use crate::table::TableModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    Columns,
    Where,
    Joins,
    QueryBuilder,
    RowData,
    Response,
}

impl HookStage {
    pub const ALL: [HookStage; 6] = [
        HookStage::Columns,
        HookStage::Where,
        HookStage::Joins,
        HookStage::QueryBuilder,
        HookStage::RowData,
        HookStage::Response,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            HookStage::Columns => "columns",
            HookStage::Where => "where",
            HookStage::Joins => "joins",
            HookStage::QueryBuilder => "query_builder",
            HookStage::RowData => "row_data",
            HookStage::Response => "response",
        }
    }
}

/// `{entity}_{stage}`, e.g. `customers_where`.
pub fn hook_name(entity: &str, stage: HookStage) -> String {
    format!("{}_{}", entity, stage.suffix())
}

/// What every hook gets to look at besides the value it transforms.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub entity: &'a str,
    pub request: &'a RequestParams,
    pub model: &'a dyn TableModel,
}

/// A set of stage callbacks. Unimplemented stages pass the value through.
pub trait TableHook: Send + Sync {
    fn columns(&self, columns: Vec<String>, _ctx: &HookContext<'_>) -> Vec<String> {
        columns
    }

    fn where_clauses(&self, clauses: Vec<Predicate>, _ctx: &HookContext<'_>) -> Vec<Predicate> {
        clauses
    }

    fn joins(&self, joins: Vec<Join>, _ctx: &HookContext<'_>) -> Vec<Join> {
        joins
    }

    /// Last chance to adjust the fully configured builder before it runs.
    fn query_builder(&self, _builder: &mut QueryBuilder<'_>, _ctx: &HookContext<'_>) {}

    fn row_data(&self, row: FormattedRow, _raw: &RawRow, _ctx: &HookContext<'_>) -> FormattedRow {
        row
    }

    fn response(&self, page: ResultPage, _ctx: &HookContext<'_>) -> ResultPage {
        page
    }
}

#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn TableHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl TableHook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn register_arc(&mut self, hook: Arc<dyn TableHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn apply_columns(&self, columns: Vec<String>, ctx: &HookContext<'_>) -> Vec<String> {
        self.hooks.iter().fold(columns, |acc, h| h.columns(acc, ctx))
    }

    pub fn apply_where(&self, clauses: Vec<Predicate>, ctx: &HookContext<'_>) -> Vec<Predicate> {
        self.hooks
            .iter()
            .fold(clauses, |acc, h| h.where_clauses(acc, ctx))
    }

    pub fn apply_joins(&self, joins: Vec<Join>, ctx: &HookContext<'_>) -> Vec<Join> {
        self.hooks.iter().fold(joins, |acc, h| h.joins(acc, ctx))
    }

    pub fn apply_query_builder(&self, builder: &mut QueryBuilder<'_>, ctx: &HookContext<'_>) {
        for h in &self.hooks {
            h.query_builder(builder, ctx);
        }
    }

    pub fn apply_row_data(
        &self,
        row: FormattedRow,
        raw: &RawRow,
        ctx: &HookContext<'_>,
    ) -> FormattedRow {
        self.hooks.iter().fold(row, |acc, h| h.row_data(acc, raw, ctx))
    }

    pub fn apply_response(&self, page: ResultPage, ctx: &HookContext<'_>) -> ResultPage {
        self.hooks.iter().fold(page, |acc, h| h.response(acc, ctx))
    }
}

/// Narrows the listing by a request field, e.g. `status_filter=inactive`
/// becomes `c.status = 'inactive'` (bound). Absent or empty fields add nothing.
#[derive(Debug, Clone)]
pub struct FieldFilterHook {
    pub field: String,
    pub column: String,
}

impl FieldFilterHook {
    pub fn new(field: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            column: column.into(),
        }
    }
}

impl TableHook for FieldFilterHook {
    fn where_clauses(&self, mut clauses: Vec<Predicate>, ctx: &HookContext<'_>) -> Vec<Predicate> {
        if let Some(value) = ctx.request.filter(&self.field) {
            clauses.push(Predicate::eq(self.column.clone(), value));
        }
        clauses
    }
}

/// The user a request runs on behalf of.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Caller {
    pub fn new(user_id: i64, capabilities: Vec<String>) -> Self {
        Self {
            user_id,
            capabilities,
        }
    }

    pub fn can(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// The "can access" check. The pipeline never consults it; whoever
/// dispatches requests must.
pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, entity: &str, caller: &Caller) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_access(&self, _entity: &str, _caller: &Caller) -> bool {
        true
    }
}

/// Requires a named capability per entity. Entities without a requirement
/// are open.
#[derive(Debug, Clone, Default)]
pub struct CapabilityPolicy {
    required: HashMap<String, String>,
}

impl CapabilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, entity: impl Into<String>, capability: impl Into<String>) -> Self {
        self.required.insert(entity.into(), capability.into());
        self
    }
}

impl AccessPolicy for CapabilityPolicy {
    fn can_access(&self, entity: &str, caller: &Caller) -> bool {
        match self.required.get(entity) {
            Some(cap) => caller.can(cap),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names_are_entity_scoped() {
        let names: Vec<String> = HookStage::ALL
            .iter()
            .map(|s| hook_name("customers", *s))
            .collect();
        assert_eq!(
            names,
            vec![
                "customers_columns",
                "customers_where",
                "customers_joins",
                "customers_query_builder",
                "customers_row_data",
                "customers_response",
            ]
        );
    }

    #[test]
    fn capability_policy() {
        let policy = CapabilityPolicy::new().require("customers", "view_customer_list");
        let viewer = Caller::new(1, vec!["view_customer_list".into()]);
        let nobody = Caller::new(2, vec![]);
        assert!(policy.can_access("customers", &viewer));
        assert!(!policy.can_access("customers", &nobody));
        assert!(policy.can_access("branches", &nobody));
        assert!(AllowAll.can_access("anything", &nobody));
    }
}
