//! Endpoint catalog and URL template resolution.
//!
//! The catalog is an externally supplied JSON object mapping a group
//! (`list`, `index`, `create`, ...) to operation names and URL templates:
//!
//! ```json
//! {
//!   "index":  { "purchaseOrder": "/purchase-orders" },
//!   "info":   { "purchaseOrder": "/purchase-orders/:id" },
//!   "create": { "purchaseOrder": "/purchase-orders" },
//!   "others": { "approveQuotation": { "url": "/quotations/:id/approve", "method": "POST" } }
//! }
//! ```
//!
//! Templates use `:name` placeholders. The HTTP method defaults from the group
//! and may be overridden per entry with the object form.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::params::QueryParams;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex is valid")
});

/// Catalog group an operation is declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointGroup {
    List,
    Info,
    Index,
    Create,
    Update,
    Search,
    Find,
    Others,
    Bulk,
}

impl EndpointGroup {
    pub const ALL: [Self; 9] = [
        Self::List,
        Self::Info,
        Self::Index,
        Self::Create,
        Self::Update,
        Self::Search,
        Self::Find,
        Self::Others,
        Self::Bulk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Info => "info",
            Self::Index => "index",
            Self::Create => "create",
            Self::Update => "update",
            Self::Search => "search",
            Self::Find => "find",
            Self::Others => "others",
            Self::Bulk => "bulk",
        }
    }

    /// Method used when a catalog entry does not name one.
    pub fn default_method(&self) -> HttpMethod {
        match self {
            Self::Create | Self::Bulk => HttpMethod::Post,
            Self::Update => HttpMethod::Put,
            _ => HttpMethod::Get,
        }
    }
}

impl fmt::Display for EndpointGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointGroup {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| CoreError::unknown_group(s))
    }
}

/// HTTP methods the API layer issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `group.name` reference to one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointRef {
    pub group: EndpointGroup,
    pub name: String,
}

impl EndpointRef {
    pub fn new(group: EndpointGroup, name: impl Into<String>) -> Self {
        Self {
            group,
            name: name.into(),
        }
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

impl FromStr for EndpointRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (group, name) = s
            .split_once('.')
            .filter(|(g, n)| !g.is_empty() && !n.is_empty())
            .ok_or_else(|| CoreError::InvalidReference(s.to_string()))?;
        Ok(Self::new(group.parse()?, name))
    }
}

/// Static definition of one logical API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    reference: EndpointRef,
    url_template: String,
    method: HttpMethod,
}

impl OperationDescriptor {
    pub fn new(reference: EndpointRef, url_template: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            reference,
            url_template: url_template.into(),
            method,
        }
    }

    pub fn reference(&self) -> &EndpointRef {
        &self.reference
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn group(&self) -> EndpointGroup {
        self.reference.group
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> Vec<&str> {
        PLACEHOLDER_REGEX
            .captures_iter(&self.url_template)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Substitute every placeholder and return the rendered path.
    ///
    /// `:id` takes `id` first and falls back to the `id` parameter; any other
    /// placeholder takes the scalar parameter of the same name. Parameters
    /// consumed by the path are removed from `params` so they are not sent
    /// again in the query string.
    pub fn render(&self, id: Option<&str>, params: &mut QueryParams) -> Result<String> {
        let mut rendered = String::with_capacity(self.url_template.len());
        let mut consumed = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER_REGEX.captures_iter(&self.url_template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();

            let value = match (name, id) {
                ("id", Some(id)) if !id.is_empty() => Some(id.to_string()),
                _ => params
                    .get(name)
                    .and_then(|v| v.as_query_string())
                    .filter(|v| !v.is_empty())
                    .inspect(|_| consumed.push(name.to_string())),
            };
            let value = value
                .ok_or_else(|| CoreError::missing_placeholder(name, &self.url_template))?;

            rendered.push_str(&self.url_template[last..whole.start()]);
            rendered.push_str(&urlencoding::encode(&value));
            last = whole.end();
        }
        rendered.push_str(&self.url_template[last..]);

        for key in consumed {
            params.remove(&key);
        }
        Ok(rendered)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogEntry {
    Template(String),
    Detailed {
        url: String,
        #[serde(default)]
        method: Option<HttpMethod>,
    },
}

/// Immutable operation catalog, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    groups: BTreeMap<EndpointGroup, IndexMap<String, OperationDescriptor>>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry using the group's default method.
    #[must_use]
    pub fn with(self, group: EndpointGroup, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.with_method(group, name, template, group.default_method())
    }

    /// Add an entry with an explicit method.
    #[must_use]
    pub fn with_method(
        mut self,
        group: EndpointGroup,
        name: impl Into<String>,
        template: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        let name = name.into();
        let descriptor =
            OperationDescriptor::new(EndpointRef::new(group, name.clone()), template, method);
        self.groups.entry(group).or_default().insert(name, descriptor);
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let groups = value
            .as_object()
            .ok_or_else(|| CoreError::invalid_catalog("catalog root must be an object"))?;

        let mut catalog = Self::new();
        for (group_name, entries) in groups {
            let group: EndpointGroup = group_name.parse()?;
            let entries = entries.as_object().ok_or_else(|| {
                CoreError::invalid_catalog(format!("group '{group_name}' must be an object"))
            })?;

            for (name, entry) in entries {
                let entry: CatalogEntry = serde_json::from_value(entry.clone()).map_err(|e| {
                    CoreError::invalid_catalog(format!("{group_name}.{name}: {e}"))
                })?;
                let (template, method) = match entry {
                    CatalogEntry::Template(url) => (url, group.default_method()),
                    CatalogEntry::Detailed { url, method } => {
                        (url, method.unwrap_or_else(|| group.default_method()))
                    }
                };
                if template.trim().is_empty() {
                    return Err(CoreError::invalid_catalog(format!(
                        "{group_name}.{name}: empty URL template"
                    )));
                }
                catalog = catalog.with_method(group, name, template, method);
            }
        }

        tracing::debug!(operations = catalog.len(), "Loaded endpoint catalog");
        Ok(catalog)
    }

    pub fn get(&self, group: EndpointGroup, name: &str) -> Option<&OperationDescriptor> {
        self.groups.get(&group).and_then(|entries| entries.get(name))
    }

    pub fn resolve(&self, reference: &EndpointRef) -> Result<&OperationDescriptor> {
        self.get(reference.group, &reference.name)
            .ok_or_else(|| CoreError::unknown_endpoint(reference.group.as_str(), &reference.name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.groups.values().flat_map(|entries| entries.values())
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
