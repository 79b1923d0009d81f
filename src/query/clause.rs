//! Structured WHERE and JOIN fragments.
//!
//! Predicates render to SQL with `?` placeholders plus their bind values, so
//! values never get spliced into the statement text. `Predicate::Raw` and
//! `Join::Raw` are the escape hatches for hand-written SQL; whoever builds
//! one owns the escaping of any literal inside it.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ALIAS_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:`[^`]+`|[A-Za-z_]\w*)$").expect("valid alias regex"));
static IDENT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[`\w]+(\.[`\w]+)*$").expect("valid identifier regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        BindValue::Bool(v)
    }
}

impl From<f64> for BindValue {
    fn from(v: f64) -> Self {
        BindValue::Real(v)
    }
}

/// A rendered SQL statement and its positional parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// One entry of a WHERE clause set; entries are ANDed together.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals(String, BindValue),
    NotEquals(String, BindValue),
    In(String, Vec<BindValue>),
    IsNull(String),
    IsNotNull(String),
    Raw { sql: String, params: Vec<BindValue> },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<BindValue>) -> Self {
        Predicate::Equals(column.into(), value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Predicate::Raw {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn raw_with(sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        Predicate::Raw {
            sql: sql.into(),
            params,
        }
    }

    pub fn render(&self, binds: &mut Vec<BindValue>) -> String {
        match self {
            Predicate::Equals(col, v) => {
                binds.push(v.clone());
                format!("{col} = ?")
            }
            Predicate::NotEquals(col, v) => {
                binds.push(v.clone());
                format!("{col} <> ?")
            }
            Predicate::In(_, values) if values.is_empty() => "1=0".to_string(),
            Predicate::In(col, values) => {
                binds.extend(values.iter().cloned());
                let marks = vec!["?"; values.len()].join(", ");
                format!("{col} IN ({marks})")
            }
            Predicate::IsNull(col) => format!("{col} IS NULL"),
            Predicate::IsNotNull(col) => format!("{col} IS NOT NULL"),
            Predicate::Raw { sql, params } => {
                binds.extend(params.iter().cloned());
                format!("({sql})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Join {
    Inner { table: String, on: String },
    Left { table: String, on: String },
    Raw(String),
}

impl Join {
    pub fn inner(table: impl Into<String>, on: impl Into<String>) -> Self {
        Join::Inner {
            table: table.into(),
            on: on.into(),
        }
    }

    pub fn left(table: impl Into<String>, on: impl Into<String>) -> Self {
        Join::Left {
            table: table.into(),
            on: on.into(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Join::Inner { table, on } => format!("INNER JOIN {table} ON {on}"),
            Join::Left { table, on } => format!("LEFT JOIN {table} ON {on}"),
            Join::Raw(sql) => sql.trim().to_string(),
        }
    }
}

/// AND of every predicate. An empty set yields `1=1` so the statement stays
/// valid whatever gets appended after it.
pub fn render_where(predicates: &[Predicate], binds: &mut Vec<BindValue>) -> String {
    if predicates.is_empty() {
        return "1=1".to_string();
    }
    predicates
        .iter()
        .map(|p| p.render(binds))
        .collect::<Vec<_>>()
        .join(" AND ")
}

pub fn render_joins(joins: &[Join]) -> String {
    joins
        .iter()
        .map(Join::render)
        .filter(|j| !j.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `expr AS alias` at its last top-level `AS`. Keywords inside
/// parentheses or quotes (`CAST(x AS INTEGER)`) do not count, and the alias
/// has to be a plain or backquoted identifier.
fn split_alias(column: &str) -> Option<(&str, &str)> {
    let trimmed = column.trim();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut found = None;
    for (i, b) in trimmed.bytes().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ if depth == 0 && b.is_ascii_whitespace() => {
                let rest = trimmed[i..].trim_start();
                let is_as = rest
                    .get(..2)
                    .map_or(false, |kw| kw.eq_ignore_ascii_case("as"))
                    && rest.as_bytes().get(2).map_or(false, u8::is_ascii_whitespace);
                if is_as {
                    found = Some((trimmed[..i].trim_end(), rest[2..].trim()));
                }
            }
            _ => {}
        }
    }
    found.filter(|(expr, alias)| !expr.is_empty() && ALIAS_NAME_RE.is_match(alias))
}

/// Name a column is addressable by in ORDER BY: the alias for `expr AS alias`,
/// the column itself otherwise.
pub fn column_alias(column: &str) -> &str {
    match split_alias(column) {
        Some((_, alias)) => alias,
        None => column.trim(),
    }
}

/// Expression part of `expr AS alias`, usable where aliases do not resolve.
pub fn column_expression(column: &str) -> &str {
    match split_alias(column) {
        Some((expr, _)) => expr,
        None => column.trim(),
    }
}

/// Key under which a selected column appears in a fetched row: the alias,
/// or the last segment of a qualified identifier such as `c.name`.
/// Bare expressions keep their text, which is how SQLite names them.
pub fn result_key(column: &str) -> &str {
    fn unquote(s: &str) -> &str {
        s.trim().trim_matches('`')
    }
    if let Some((_, alias)) = split_alias(column) {
        return unquote(alias);
    }
    let trimmed = column.trim();
    if IDENT_PATH_RE.is_match(trimmed) {
        return unquote(trimmed.rsplit('.').next().unwrap_or(trimmed));
    }
    trimmed
}

/// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
