//! Configuration loader and validator for the DataTable bridge.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::RawRow;
use crate::present::{Cell, FormattedRow};
use crate::query::{result_key, Join, Predicate};
use crate::table::{TableModel, MAX_PAGE_LENGTH};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub database_url: String,
    #[serde(default = "default_max_page_length")]
    pub max_page_length: i64,
    /// 0 disables response caching.
    #[serde(default)]
    pub cache_ttl_seconds: u64,
}

/// A listing defined entirely in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableConfig {
    pub entity: String,
    pub table: String,
    pub index_column: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub searchable: Vec<String>,
    /// Raw SQL predicates, ANDed.
    #[serde(default)]
    pub base_where: Vec<String>,
    /// Raw SQL join clauses, in order.
    #[serde(default)]
    pub joins: Vec<String>,
    /// Request field -> column equality filters.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Capability a caller needs to read this listing.
    #[serde(default)]
    pub capability: Option<String>,
}

fn default_max_page_length() -> i64 {
    MAX_PAGE_LENGTH
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if !(1..=MAX_PAGE_LENGTH).contains(&cfg.app.max_page_length) {
        return Err(ConfigError::Invalid("app.max_page_length must be within 1..=100"));
    }

    let mut seen = HashSet::new();
    for t in &cfg.tables {
        if t.entity.trim().is_empty() {
            return Err(ConfigError::Invalid("tables[].entity must be non-empty"));
        }
        if !seen.insert(t.entity.as_str()) {
            return Err(ConfigError::Invalid("tables[].entity must be unique"));
        }
        if t.table.trim().is_empty() {
            return Err(ConfigError::Invalid("tables[].table must be non-empty"));
        }
        if t.index_column.trim().is_empty() {
            return Err(ConfigError::Invalid("tables[].index_column must be non-empty"));
        }
        if t.columns.is_empty() || t.columns.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("tables[].columns must list non-empty columns"));
        }
        if t.searchable.iter().any(|s| !t.columns.contains(s)) {
            return Err(ConfigError::Invalid("tables[].searchable must be a subset of columns"));
        }
        if t.filters.values().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid("tables[].filters must map to non-empty columns"));
        }
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/datatable.db"
  max_page_length: 100
  cache_ttl_seconds: 30

tables:
  - entity: branches
    table: "app_customer_branches b"
    index_column: "b.id"
    columns:
      - "b.id"
      - "b.name"
      - "b.city"
      - "c.name AS customer_name"
      - "b.status"
    searchable:
      - "b.name"
      - "b.city"
      - "c.name AS customer_name"
    base_where:
      - "b.status <> 'deleted'"
    joins:
      - "INNER JOIN app_customers c ON c.id = b.customer_id"
    filters:
      status_filter: "b.status"
      customer_id: "b.customer_id"
    capability: "view_branch_list"
"#
}

/// [`TableModel`] backed by a [`TableConfig`]. Rows come out in column
/// order, each cell the raw value of its column.
#[derive(Debug, Clone)]
pub struct ConfiguredTable {
    cfg: TableConfig,
}

impl ConfiguredTable {
    pub fn new(cfg: TableConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &TableConfig {
        &self.cfg
    }
}

impl TableModel for ConfiguredTable {
    fn entity(&self) -> &str {
        &self.cfg.entity
    }

    fn table_name(&self) -> &str {
        &self.cfg.table
    }

    fn columns(&self) -> Vec<String> {
        self.cfg.columns.clone()
    }

    fn searchable_columns(&self) -> Vec<String> {
        self.cfg.searchable.clone()
    }

    fn index_column(&self) -> &str {
        &self.cfg.index_column
    }

    fn base_where(&self) -> Vec<Predicate> {
        self.cfg.base_where.iter().map(Predicate::raw).collect()
    }

    fn base_joins(&self) -> Vec<Join> {
        self.cfg.joins.iter().cloned().map(Join::Raw).collect()
    }

    fn format_row(&self, row: &RawRow) -> FormattedRow {
        self.cfg
            .columns
            .iter()
            .map(|c| Cell::Value(row.get(result_key(c)).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}
