//! Query parameter encoding.
//!
//! Parameters are a flat mapping of scalars plus one nested mapping,
//! conventionally called `search`, which is flattened with the bracket
//! convention: `{page: 2, search: {id: 5}}` encodes as `page=2&search[id]=5`.
//! Null values are dropped at every level.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Name of the nested parameter mapping.
pub const SEARCH_KEY: &str = "search";

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl QueryValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String form used on the wire, `None` for null.
    pub fn as_query_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(format_float(*f)),
            Self::Text(s) => Some(s.clone()),
        }
    }

    /// Convert a JSON scalar. Arrays and objects are rejected.
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Ok(Self::Text(n.to_string()))
                }
            }
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Array(_) => Err(CoreError::unsupported_param(
                key,
                "arrays are not encodable",
            )),
            Value::Object(_) => Err(CoreError::unsupported_param(
                key,
                "only the 'search' parameter may hold a nested mapping",
            )),
        }
    }
}

// Integral floats print without a fractional part, matching how the API's
// clients have always stringified numbers.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for QueryValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Text(value.to_string()))
    }
}

impl From<usize> for QueryValue {
    fn from(value: usize) -> Self {
        Self::from(value as u64)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Parameters for one read operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    scalars: IndexMap<String, QueryValue>,
    search: IndexMap<String, QueryValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level scalar parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add an entry to the nested `search` mapping.
    #[must_use]
    pub fn with_search(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert_search(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.scalars.insert(key.into(), value.into());
    }

    pub fn insert_search(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.search.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.scalars.get(key)
    }

    pub fn search(&self) -> &IndexMap<String, QueryValue> {
        &self.search
    }

    /// Remove a top-level scalar, keeping the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.scalars.shift_remove(key)
    }

    /// True when no non-null value would be encoded.
    pub fn is_empty(&self) -> bool {
        self.scalars.values().all(QueryValue::is_null) && self.search.values().all(QueryValue::is_null)
    }

    /// Build parameters from a JSON object.
    ///
    /// Only the `search` key may hold a nested object, and only scalars are
    /// allowed inside it.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            _ => {
                return Err(CoreError::unsupported_param(
                    "<root>",
                    "parameters must be a JSON object",
                ));
            }
        };

        let mut params = Self::new();
        for (key, value) in object {
            match value {
                Value::Object(nested) if key == SEARCH_KEY => {
                    for (nested_key, nested_value) in nested {
                        let path = format!("{SEARCH_KEY}.{nested_key}");
                        params.insert_search(nested_key, QueryValue::from_json(&path, nested_value)?);
                    }
                }
                other => params.insert(key, QueryValue::from_json(key, other)?),
            }
        }
        Ok(params)
    }

    /// Non-null `(key, value)` pairs in wire order, before percent-encoding.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let scalars = self
            .scalars
            .iter()
            .filter_map(|(k, v)| v.as_query_string().map(|s| (k.clone(), s)));
        let nested = self
            .search
            .iter()
            .filter_map(|(k, v)| v.as_query_string().map(|s| (format!("{SEARCH_KEY}[{k}]"), s)));
        scalars.chain(nested).collect()
    }

    /// Encode as a query string without the leading `?`.
    pub fn encode(&self) -> String {
        join_pairs(self.pairs())
    }

    /// Key-sorted encoding, stable regardless of insertion order.
    pub fn canonical(&self) -> String {
        let mut pairs = self.pairs();
        pairs.sort();
        join_pairs(pairs)
    }
}

fn join_pairs(pairs: Vec<(String, String)>) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_key(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_key(key: &str) -> String {
    match key
        .strip_prefix(SEARCH_KEY)
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(inner) => format!("{SEARCH_KEY}[{}]", urlencoding::encode(inner)),
        None => urlencoding::encode(key).into_owned(),
    }
}

/// Decode a query string into `(key, value)` pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut parts = segment.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
