use colored::Colorize;
use opsdesk_core::{EndpointCatalog, OptionPair};
use serde_json::{Value, json};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => print_as_table(value),
    }
}

pub fn print_options(options: &[OptionPair], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(options)),
        OutputFormat::Table => {
            if options.is_empty() {
                println!("No options.");
                return;
            }
            let mut builder = Builder::default();
            builder.push_record(["Value", "Label"]);
            for option in options {
                builder.push_record([option.value.as_str(), option.label.as_str()]);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
}

pub fn print_catalog(catalog: &EndpointCatalog, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let entries: Vec<Value> = catalog
                .iter()
                .map(|op| {
                    json!({
                        "endpoint": op.reference().to_string(),
                        "method": op.method().as_str(),
                        "url": op.url_template(),
                    })
                })
                .collect();
            print_json(&Value::Array(entries));
        }
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["Group", "Name", "Method", "URL"]);
            for op in catalog.iter() {
                builder.push_record([
                    op.group().as_str(),
                    op.name(),
                    op.method().as_str(),
                    op.url_template(),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            println!("Total: {}", catalog.len());
        }
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => print_error(&format!("Failed to render JSON: {e}")),
    }
}

fn print_as_table(value: &Value) {
    let rows = value
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| value.as_array());

    let Some(rows) = rows.filter(|rows| rows.iter().all(Value::is_object)) else {
        print_json(value);
        return;
    };
    if rows.is_empty() {
        println!("No records found.");
        return;
    }

    // columns follow the first record's key order
    let columns: Vec<&str> = rows[0]
        .as_object()
        .map(|first| first.keys().map(String::as_str).collect())
        .unwrap_or_default();

    let mut builder = Builder::default();
    builder.push_record(columns.iter().copied());
    for row in rows {
        builder.push_record(columns.iter().map(|column| cell(row.get(*column))));
    }
    println!("{}", builder.build().with(Style::rounded()));
    if let Some(total) = value.get("total").and_then(Value::as_u64) {
        println!("Total: {total}");
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
