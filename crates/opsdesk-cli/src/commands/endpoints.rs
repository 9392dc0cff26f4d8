use opsdesk_core::EndpointCatalog;

use crate::cli::OutputFormat;
use crate::output::print_catalog;

pub fn list(catalog: &EndpointCatalog, format: OutputFormat) {
    print_catalog(catalog, format);
}
