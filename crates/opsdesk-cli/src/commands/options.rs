use anyhow::{Context, Result};
use opsdesk_client::QueryClient;
use opsdesk_core::{OptionFields, OptionPair, project_dictionary, project_entities, project_grouped, resolve_label};
use serde_json::Value;

use crate::cli::{OptionsArgs, OutputFormat};
use crate::commands::fetch::fetch_value;
use crate::output::print_options;

pub async fn options(client: &QueryClient, args: &OptionsArgs, format: OutputFormat) -> Result<()> {
    let response = fetch_value(client, &args.endpoint, &args.params, None).await?;
    let options = project(&response, args)?;

    match &args.resolve {
        Some(candidate) => println!("{}", resolve_label(&options, candidate, &args.field_name)),
        None => print_options(&options, format),
    }
    Ok(())
}

fn project(response: &Value, args: &OptionsArgs) -> Result<Vec<OptionPair>> {
    let data = response.get(&args.data_field).unwrap_or(response);
    let fields = OptionFields::new(&args.value_field, &args.label_field);

    match data {
        Value::Object(dictionary) => Ok(project_dictionary(dictionary)),
        Value::Array(entities) => match &args.group {
            Some(group) => {
                let (field, value) = group
                    .split_once('=')
                    .context("--group expects FIELD=VALUE")?;
                Ok(project_grouped(entities, &fields, field, value))
            }
            None => Ok(project_entities(entities, &fields)),
        },
        other => anyhow::bail!(
            "Field \"{}\" holds {}, expected an object or an array",
            args.data_field,
            opsdesk_core::Kind::of(other)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    use crate::cli::{Cli, Commands};

    fn options_args(extra: &[&str]) -> OptionsArgs {
        let mut argv = vec!["opsdesk", "options", "list.color"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Options(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_dictionary_response() {
        let response = json!({"status": true, "data": {"1": "Red", "2": "Blue"}});
        let options = project(&response, &options_args(&[])).unwrap();
        assert_eq!(options, vec![OptionPair::new("1", "Red"), OptionPair::new("2", "Blue")]);
        assert_eq!(resolve_label(&options, "3", "Color"), "Unknown Color");
    }

    #[test]
    fn test_grouped_entities() {
        let response = json!({"data": [
            {"code": "kg", "title": "Kilogram", "kind": "weight"},
            {"code": "m", "title": "Metre", "kind": "length"}
        ]});
        let args = options_args(&["--value-field", "code", "--label-field", "title", "--group", "kind=length"]);
        let options = project(&response, &args).unwrap();
        assert_eq!(options, vec![OptionPair::new("m", "Metre")]);
    }

    #[test]
    fn test_scalar_data_is_rejected() {
        let response = json!({"data": 5});
        assert!(project(&response, &options_args(&[])).is_err());
    }
}
