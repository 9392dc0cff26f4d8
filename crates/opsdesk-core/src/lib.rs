pub mod endpoints;
pub mod error;
pub mod options;
pub mod params;
pub mod schema;

pub use endpoints::{EndpointCatalog, EndpointGroup, EndpointRef, HttpMethod, OperationDescriptor};
pub use error::{CoreError, ErrorCategory, Result};
pub use options::{
    OptionFields, OptionPair, project_dictionary, project_entities, project_grouped,
    project_pairs, resolve_label,
};
pub use params::{QueryParams, QueryValue, SEARCH_KEY, parse_query};
pub use schema::{Kind, Shape, Validated, ValidationError, Violation, parse, validate_value};
