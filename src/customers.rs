//! Built-in `customers` listing over the bundled demo schema.
use serde_json::Value;

use crate::model::RawRow;
use crate::present::{value_text, ActionKind, BadgeTone, Cell, FormattedRow, RowAction};
use crate::query::{BindValue, Predicate};
use crate::table::TableModel;

pub const ENTITY: &str = "customers";

#[derive(Debug, Clone, Default)]
pub struct CustomerTable;

impl TableModel for CustomerTable {
    fn entity(&self) -> &str {
        ENTITY
    }

    fn table_name(&self) -> &str {
        "app_customers c"
    }

    fn columns(&self) -> Vec<String> {
        vec![
            "c.id".into(),
            "c.code".into(),
            "c.name".into(),
            "c.email".into(),
            "c.status".into(),
            "(SELECT COUNT(*) FROM app_customer_branches b WHERE b.customer_id = c.id) AS branch_count"
                .into(),
        ]
    }

    fn searchable_columns(&self) -> Vec<String> {
        vec!["c.code".into(), "c.name".into(), "c.email".into()]
    }

    fn index_column(&self) -> &str {
        "c.id"
    }

    fn base_where(&self) -> Vec<Predicate> {
        vec![Predicate::NotEquals(
            "c.status".into(),
            BindValue::Text("deleted".into()),
        )]
    }

    fn format_row(&self, row: &RawRow) -> FormattedRow {
        let field = |key: &str| row.get(key).cloned().unwrap_or(Value::Null);
        let id = value_text(&field("id"));
        let email = match field("email") {
            Value::Null => Cell::text("-"),
            v => Cell::Value(v),
        };
        let status = value_text(&field("status"));
        vec![
            Cell::Value(field("id")),
            Cell::Value(field("code")),
            Cell::Value(field("name")),
            email,
            Cell::badge(status.clone(), status_tone(&status)),
            Cell::Value(field("branch_count")),
            Cell::Actions(vec![
                RowAction::new(ActionKind::View, "customer", id.clone()),
                RowAction::new(ActionKind::Edit, "customer", id.clone()),
                RowAction::new(ActionKind::Delete, "customer", id),
            ]),
        ]
    }
}

fn status_tone(status: &str) -> BadgeTone {
    match status {
        "active" => BadgeTone::Success,
        "inactive" => BadgeTone::Warning,
        "suspended" => BadgeTone::Danger,
        _ => BadgeTone::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::render_row;
    use serde_json::json;

    #[test]
    fn formats_positional_cells() {
        let raw = json!({
            "id": 3, "code": "C-3", "name": "Carol", "email": null,
            "status": "inactive", "branch_count": 2
        });
        let raw = raw.as_object().unwrap().clone();
        let rendered = render_row(&CustomerTable.format_row(&raw));
        assert_eq!(rendered.len(), 7);
        assert_eq!(rendered[0], json!(3));
        assert_eq!(rendered[3], json!("-"));
        assert!(rendered[4].as_str().unwrap().contains("badge-warning"));
        assert_eq!(rendered[5], json!(2));
        assert!(rendered[6].as_str().unwrap().contains("data-id=\"3\""));
    }
}
