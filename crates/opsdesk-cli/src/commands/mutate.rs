use anyhow::Result;
use colored::Colorize;
use opsdesk_client::{
    ClientError, MutationFailure, MutationOutcome, MutationReply, MutationRequest, QueryClient,
};
use serde_json::Value;

use crate::cli::{MutateArgs, OutputFormat};
use crate::commands::{parse_params, read_body};
use crate::output::{print_success, print_value};

pub async fn mutate(client: &QueryClient, args: &MutateArgs, format: OutputFormat) -> Result<()> {
    let token = client.register_mutation::<Value>(args.endpoint.clone(), &[])?;

    let mut request = MutationRequest::new(read_body(args.file.as_deref())?)
        .with_params(parse_params(&args.params)?);
    if let Some(id) = &args.id {
        request = request.with_id(id);
    }

    let endpoint = args.endpoint.to_string();
    let reply = settle(&endpoint, client.mutate(&token, &request).await)?;

    let message = reply.message.as_deref().unwrap_or("Applied");
    match &reply.id {
        Some(id) => print_success(&format!("{} {} (id {})", endpoint.cyan(), message, id)),
        None => print_success(&format!("{} {}", endpoint.cyan(), message)),
    }
    print_value(&reply.data, format);
    Ok(())
}

/// Accepted reply, or one error carrying the server's message. Reported once by `main`.
fn settle(
    endpoint: &str,
    result: Result<MutationOutcome<Value>, ClientError>,
) -> Result<MutationReply<Value>> {
    let failure = |f: MutationFailure<'_>| anyhow::anyhow!("{endpoint}: {}", f.message());
    match result {
        Ok(MutationOutcome::Applied(reply)) => Ok(reply),
        Ok(MutationOutcome::Rejected(rejection)) => Err(failure(MutationFailure::Rejected(&rejection))),
        Err(err) => Err(failure(MutationFailure::Failed(&err))),
    }
}
