use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use opsdesk_core::EndpointRef;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "opsdesk CLI: typed, validated access to the operations API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./opsdesk.toml when present)
    #[arg(short, long, global = true, env = "OPSDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// API base URL (overrides api.base_url)
    #[arg(short, long, global = true, env = "OPSDESK_URL")]
    pub server: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a read operation (e.g. index.purchaseOrder page=2 search[vendor]=acme)
    Fetch(FetchArgs),
    /// Run a write operation with a JSON body
    Mutate(MutateArgs),
    /// Project a read into value/label options
    Options(OptionsArgs),
    /// List the endpoint catalog
    Endpoints,
}

#[derive(clap::Args)]
pub struct FetchArgs {
    /// Catalog entry as group.name
    pub endpoint: EndpointRef,
    /// Query parameters as key=value; search[key]=value nests under search
    pub params: Vec<String>,
    /// Value for the :id placeholder
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(clap::Args)]
pub struct MutateArgs {
    /// Catalog entry as group.name
    pub endpoint: EndpointRef,
    /// Placeholder values and query parameters as key=value
    pub params: Vec<String>,
    /// Value for the :id placeholder
    #[arg(long)]
    pub id: Option<String>,
    /// Path to JSON body (reads from stdin if omitted)
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct OptionsArgs {
    /// Catalog entry as group.name
    pub endpoint: EndpointRef,
    /// Query parameters as key=value
    pub params: Vec<String>,
    /// Response field holding the entities or dictionary
    #[arg(long, default_value = "data")]
    pub data_field: String,
    /// Entity field used as option value
    #[arg(long, default_value = "id")]
    pub value_field: String,
    /// Entity field used as option label
    #[arg(long, default_value = "name")]
    pub label_field: String,
    /// Keep only entities whose FIELD equals VALUE (FIELD=VALUE)
    #[arg(long)]
    pub group: Option<String>,
    /// Print the label for this value instead of the whole list
    #[arg(long)]
    pub resolve: Option<String>,
    /// Field name used in the "Unknown" label
    #[arg(long, default_value = "option")]
    pub field_name: String,
}
