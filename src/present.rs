//! Presentation of formatted rows.
//!
//! Table models shape rows into [`Cell`]s (plain values plus a few structured
//! widgets); this module turns them into the positional JSON array the grid
//! consumes, rendering widgets to HTML fragments.
use serde_json::Value;

pub type FormattedRow = Vec<Cell>;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    Badge { label: String, tone: BadgeTone },
    Link { label: String, href: String },
    Actions(Vec<RowAction>),
}

impl Cell {
    pub fn value(v: impl Into<Value>) -> Self {
        Cell::Value(v.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Cell::Value(Value::String(s.into()))
    }

    pub fn badge(label: impl Into<String>, tone: BadgeTone) -> Self {
        Cell::Badge {
            label: label.into(),
            tone,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Value(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Success,
    Warning,
    Danger,
    Neutral,
}

impl BadgeTone {
    fn class(&self) -> &'static str {
        match self {
            BadgeTone::Success => "success",
            BadgeTone::Warning => "warning",
            BadgeTone::Danger => "danger",
            BadgeTone::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    View,
    Edit,
    Delete,
}

impl ActionKind {
    fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            ActionKind::View => "visibility",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "trash",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ActionKind::View => "View",
            ActionKind::Edit => "Edit",
            ActionKind::Delete => "Delete",
        }
    }
}

/// A per-row button; the front end binds on `{kind}-{entity}` and reads
/// `data-id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAction {
    pub kind: ActionKind,
    pub entity: String,
    pub id: String,
}

impl RowAction {
    pub fn new(kind: ActionKind, entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// Display text of a JSON value: strings unquoted, null empty.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_row(row: &[Cell]) -> Vec<Value> {
    row.iter().map(render_cell).collect()
}

pub fn render_cell(cell: &Cell) -> Value {
    match cell {
        Cell::Value(v) => v.clone(),
        Cell::Badge { label, tone } => Value::String(format!(
            "<span class=\"badge badge-{}\">{}</span>",
            tone.class(),
            html_escape(label)
        )),
        Cell::Link { label, href } => Value::String(format!(
            "<a href=\"{}\">{}</a>",
            html_attr(href),
            html_escape(label)
        )),
        Cell::Actions(actions) => Value::String(
            actions
                .iter()
                .map(render_action)
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

fn render_action(action: &RowAction) -> String {
    format!(
        "<button type=\"button\" class=\"button {}-{}\" data-id=\"{}\" title=\"{}\"><i class=\"dashicons dashicons-{}\"></i></button>",
        action.kind.as_str(),
        html_attr(&action.entity),
        html_attr(&action.id),
        action.kind.title(),
        action.kind.icon()
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn html_attr(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}
