//! Request dispatch: action name -> table, with the access check in front.
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::{CachedTable, ResponseCache};
use crate::config::{Config, ConfiguredTable};
use crate::customers::{self, CustomerTable};
use crate::db::DataSource;
use crate::hooks::{AccessPolicy, Caller, CapabilityPolicy, FieldFilterHook, HookChain};
use crate::model::{RequestParams, ResultPage};
use crate::table::{DataTable, PageSource};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("you do not have permission to view {0}")]
    AccessDenied(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HandlerError {
    /// `{"success": false, "data": {"message": ...}}`, the shape the admin
    /// scripts expect from a failed call.
    pub fn to_json(&self) -> Value {
        json!({ "success": false, "data": { "message": self.to_string() } })
    }
}

pub struct DataTableHandler {
    tables: HashMap<String, Arc<dyn PageSource>>,
    policy: Arc<dyn AccessPolicy>,
}

impl DataTableHandler {
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            tables: HashMap::new(),
            policy,
        }
    }

    pub fn action_name(entity: &str) -> String {
        format!("{entity}_datatable")
    }

    /// Register a table under `{entity}_datatable`, replacing any previous
    /// table of the same entity. Returns the action name.
    pub fn register(&mut self, table: Arc<dyn PageSource>) -> String {
        let action = Self::action_name(table.entity());
        if self.tables.insert(action.clone(), table).is_some() {
            warn!(%action, "replaced existing datatable registration");
        }
        action
    }

    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.tables.keys().cloned().collect();
        actions.sort();
        actions
    }

    #[instrument(skip_all, fields(action = %action, user_id = caller.user_id))]
    pub async fn handle(
        &self,
        action: &str,
        params: &Value,
        caller: &Caller,
    ) -> Result<ResultPage, HandlerError> {
        let table = self
            .tables
            .get(action)
            .ok_or_else(|| HandlerError::UnknownAction(action.to_string()))?;
        let entity = table.entity();
        if !self.policy.can_access(entity, caller) {
            warn!(entity, "access denied");
            return Err(HandlerError::AccessDenied(entity.to_string()));
        }
        if !params.is_object() {
            return Err(HandlerError::InvalidRequest(
                "parameters must be a JSON object".into(),
            ));
        }
        let request = RequestParams::from_value(params.clone())
            .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?;
        Ok(table.page(&request).await)
    }

    /// Wire the built-in customers table and every configured table against
    /// one data source. A configured `customers` entity replaces the built-in.
    pub fn from_config(cfg: &Config, source: Arc<dyn DataSource>) -> Self {
        let mut policy = CapabilityPolicy::new();
        for t in &cfg.tables {
            if let Some(cap) = &t.capability {
                policy = policy.require(t.entity.clone(), cap.clone());
            }
        }
        let mut handler = Self::new(Arc::new(policy));
        let cache = (cfg.app.cache_ttl_seconds > 0)
            .then(|| Arc::new(ResponseCache::new(cfg.app.cache_ttl_seconds)));
        let max_length = cfg.app.max_page_length;

        let mut tables: Vec<Arc<dyn PageSource>> = Vec::new();
        if !cfg.tables.iter().any(|t| t.entity == customers::ENTITY) {
            let mut hooks = HookChain::new();
            hooks.register(FieldFilterHook::new("status_filter", "c.status"));
            tables.push(Arc::new(
                DataTable::new(CustomerTable, source.clone())
                    .with_hooks(hooks)
                    .with_max_length(max_length),
            ));
        }
        for t in &cfg.tables {
            let mut hooks = HookChain::new();
            for (field, column) in &t.filters {
                hooks.register(FieldFilterHook::new(field.clone(), column.clone()));
            }
            tables.push(Arc::new(
                DataTable::new(ConfiguredTable::new(t.clone()), source.clone())
                    .with_hooks(hooks)
                    .with_max_length(max_length),
            ));
        }

        for table in tables {
            let table: Arc<dyn PageSource> = match &cache {
                Some(cache) => Arc::new(CachedTable::new(table, cache.clone())),
                None => table,
            };
            handler.register(table);
        }
        info!(actions = ?handler.actions(), "datatable actions registered");
        handler
    }
}
