//! Request and response shapes of the DataTables server-side protocol.
//!
//! The grid posts loosely typed parameters (numbers often arrive as strings),
//! so numeric fields are coerced the way a form handler would: a leading
//! integer is taken, anything unparseable becomes `0`.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::query::QueryFailure;

/// One database row keyed by column name (or alias).
pub type RawRow = Map<String, Value>;

/// Page size assumed when the client does not send `length`.
pub const DEFAULT_PAGE_LENGTH: i64 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` (any case) sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl From<&str> for SortDirection {
    fn from(raw: &str) -> Self {
        SortDirection::parse(raw)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchParam {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderParam {
    #[serde(default, deserialize_with = "de_intval")]
    pub column: i64,
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub dir: String,
}

impl OrderParam {
    pub fn direction(&self) -> SortDirection {
        SortDirection::parse(&self.dir)
    }
}

/// Inbound page request. Built fresh per request and never mutated by the
/// pipeline; entity-specific filters stay in `extra` for hooks to read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestParams {
    #[serde(default, deserialize_with = "de_intval")]
    pub draw: i64,
    #[serde(default, deserialize_with = "de_intval")]
    pub start: i64,
    #[serde(default = "default_length", deserialize_with = "de_intval")]
    pub length: i64,
    #[serde(default, deserialize_with = "de_search")]
    pub search: SearchParam,
    #[serde(default, deserialize_with = "de_order")]
    pub order: Vec<OrderParam>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            draw: 0,
            start: 0,
            length: DEFAULT_PAGE_LENGTH,
            search: SearchParam::default(),
            order: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl RequestParams {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn search_value(&self) -> &str {
        &self.search.value
    }

    /// Only the first ordering entry is honoured.
    pub fn primary_order(&self) -> Option<&OrderParam> {
        self.order.first()
    }

    /// Entity-specific filter field as a string, if present and non-empty.
    pub fn filter(&self, key: &str) -> Option<String> {
        let value = self.extra.get(key)?;
        let s = lenient_string(value);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}

/// Outbound envelope. `failures` is the out-of-band error channel and never
/// reaches the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub draw: i64,
    pub records_total: i64,
    pub records_filtered: i64,
    pub data: Vec<Vec<Value>>,
    #[serde(skip)]
    pub failures: Vec<QueryFailure>,
}

impl ResultPage {
    pub fn empty(draw: i64) -> Self {
        Self {
            draw,
            records_total: 0,
            records_filtered: 0,
            data: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True when at least one query failed and the page was degraded.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

fn default_length() -> i64 {
    DEFAULT_PAGE_LENGTH
}

/// Integer coercion with form-handler semantics.
pub fn intval(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => *b as i64,
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| u.min(i64::MAX as u64) as i64))
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_leading_int(s),
        Value::Array(items) => !items.is_empty() as i64,
        Value::Object(_) => 0,
    }
}

fn parse_leading_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut acc: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let d = (b - b'0') as i64;
        acc = match acc.checked_mul(10).and_then(|v| v.checked_add(d)) {
            Some(v) => v,
            None => return if negative { i64::MIN } else { i64::MAX },
        };
    }
    if negative {
        -acc
    } else {
        acc
    }
}

fn lenient_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        _ => String::new(),
    }
}

fn de_intval<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(intval(&value))
}

fn de_lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(lenient_string(&value))
}

fn de_search<'de, D: Deserializer<'de>>(d: D) -> Result<SearchParam, D::Error> {
    Ok(Option::<SearchParam>::deserialize(d)?.unwrap_or_default())
}

fn de_order<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<OrderParam>, D::Error> {
    Ok(Option::<Vec<OrderParam>>::deserialize(d)?.unwrap_or_default())
}
