pub mod endpoints;
pub mod fetch;
pub mod mutate;
pub mod options;

use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use opsdesk_core::{QueryParams, QueryValue};
use serde_json::Value;

/// Parse `key=value` arguments. `search[key]=value` nests under `search`;
/// an empty value is a null and is left out of the query string.
pub(crate) fn parse_params(raw: &[String]) -> Result<QueryParams> {
    let mut params = QueryParams::new();
    for param in raw {
        let Some((key, value)) = param.split_once('=') else {
            anyhow::bail!("Invalid parameter \"{param}\". Expected format: key=value");
        };
        let value = if value.is_empty() {
            QueryValue::Null
        } else {
            QueryValue::from(value)
        };
        match key.strip_prefix("search[").and_then(|k| k.strip_suffix(']')) {
            Some(inner) if !inner.is_empty() => params.insert_search(inner, value),
            Some(_) => anyhow::bail!("Invalid parameter \"{param}\": empty search key"),
            None if key.is_empty() => anyhow::bail!("Invalid parameter \"{param}\": empty key"),
            None => params.insert(key, value),
        }
    }
    Ok(params)
}

pub(crate) fn read_body(file: Option<&str>) -> Result<Value> {
    let content = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid JSON")
}
