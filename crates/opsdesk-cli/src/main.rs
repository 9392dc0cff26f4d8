mod cli;
mod commands;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use opsdesk_client::{ClientConfig, QueryClient};
use opsdesk_config::AppSettings;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        // a missing .env is fine
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    let mut settings = opsdesk_config::load_settings(cli.config.as_deref())
        .context("Failed to load settings")?;
    if let Some(server) = &cli.server {
        settings.api.base_url = server.clone();
        settings.validate()?;
    }
    observability::init_tracing_with_level(&settings.logging.level);

    let catalog = Arc::new(opsdesk_config::load_catalog()?);
    tracing::debug!(base_url = %settings.api.base_url, operations = catalog.len(), "Starting");

    match &cli.command {
        Commands::Endpoints => commands::endpoints::list(&catalog, format),
        Commands::Fetch(args) => {
            let client = make_client(&settings, catalog)?;
            commands::fetch::fetch(&client, args, format).await?;
        }
        Commands::Mutate(args) => {
            let client = make_client(&settings, catalog)?;
            commands::mutate::mutate(&client, args, format).await?;
        }
        Commands::Options(args) => {
            let client = make_client(&settings, catalog)?;
            commands::options::options(&client, args, format).await?;
        }
    }

    Ok(())
}

fn client_config(settings: &AppSettings) -> ClientConfig {
    let mut config = ClientConfig::new(&settings.api.base_url)
        .with_request_timeout(settings.request_timeout())
        .with_retry(settings.api.retry)
        .with_refetch_on_focus(settings.cache.refetch_on_focus)
        .with_gc_after(settings.gc_after());
    if let Some(token) = &settings.api.bearer_token {
        config = config.with_bearer_token(token);
    }
    if let Some(age) = settings.stale_after() {
        config = config.with_stale_after(age);
    }
    config
}

fn make_client(settings: &AppSettings, catalog: Arc<opsdesk_core::EndpointCatalog>) -> Result<QueryClient> {
    Ok(QueryClient::with_reqwest(catalog, client_config(settings))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_config_from_settings() {
        let mut settings = AppSettings::default();
        settings.api.retry = 4;
        settings.api.bearer_token = Some("token".into());
        settings.cache.stale_after_secs = Some(30);

        let config = client_config(&settings);
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.retry, 4);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.bearer_token.as_deref(), Some("token"));
        assert_eq!(config.stale_after, Some(Duration::from_secs(30)));
    }
}
