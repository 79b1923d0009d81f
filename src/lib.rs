//! Server-side backend for paginated, searchable, sortable admin grids.
//!
//! A grid request ([`model::RequestParams`]) is served by a
//! [`table::DataTable`]: the entity's [`table::TableModel`] supplies columns
//! and base filters, a [`query::QueryBuilder`] renders and runs the page and
//! count queries through a [`db::DataSource`], and the [`hooks::HookChain`]
//! registered on the table may rewrite every intermediate value.

pub mod cache;
pub mod config;
pub mod customers;
pub mod db;
pub mod handler;
pub mod hooks;
pub mod model;
pub mod present;
pub mod query;
pub mod table;
