use anyhow::{Context, Result};
use opsdesk_client::{FetchRequest, QueryClient};
use serde_json::Value;

use crate::cli::{FetchArgs, OutputFormat};
use crate::commands::parse_params;
use crate::output::print_value;

pub async fn fetch(client: &QueryClient, args: &FetchArgs, format: OutputFormat) -> Result<()> {
    let value = fetch_value(client, &args.endpoint, &args.params, args.id.as_deref()).await?;
    print_value(&value, format);
    Ok(())
}

/// Run a read as an untyped JSON value.
pub(crate) async fn fetch_value(
    client: &QueryClient,
    endpoint: &opsdesk_core::EndpointRef,
    raw_params: &[String],
    id: Option<&str>,
) -> Result<Value> {
    let token = client.register_read::<Value>(&endpoint.to_string(), endpoint.clone())?;
    let mut request = FetchRequest::new(parse_params(raw_params)?);
    if let Some(id) = id {
        request = request.with_id(id);
    }
    client
        .fetch(&token, &request)
        .await
        .with_context(|| format!("Failed to fetch {endpoint}"))
}
