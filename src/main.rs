use std::{
    io::Read,
    path::{Path, PathBuf},
    process::ExitCode,
};

use attrpath::{
    config::{ConfigError, EngineConfig},
    error::{EngineError, ErrorResponse},
    evaluate::Evaluator,
    filter::parse_filter_with,
    observability::{TracingError, init_tracing},
    path::Path as AttrPath,
    projection::{ProjectionSpec, trim},
    query::{ALWAYS_RETURNED, SearchPlan},
    schema::SchemaRegistry,
};
use clap::Parser;
use serde_json::{Value, json};

/// CLI arguments for attrpath
#[derive(Parser, Debug)]
#[command(version, about = "Attribute-path filter and projection engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to builtin schemas and limits)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse a filter and print its canonical form
    Parse {
        /// Filter expression
        filter: String,
    },
    /// Translate a filter against a resource type's schema
    Translate {
        /// Resource type (e.g. User, Group)
        resource_type: String,
        /// Filter expression
        filter: String,
    },
    /// Evaluate a filter against a JSON document or array of documents
    Eval {
        /// Filter expression
        filter: String,
        /// JSON input file (defaults to stdin)
        file: Option<PathBuf>,
    },
    /// Trim a JSON document or array of documents to the requested attributes
    Trim {
        /// Comma-separated attributes to return
        #[arg(short, long)]
        attributes: Option<String>,
        /// Comma-separated attributes to leave out
        #[arg(short, long)]
        excluded_attributes: Option<String>,
        /// JSON input file (defaults to stdin)
        file: Option<PathBuf>,
    },
    /// List resource types, or the attributes of one
    Schema {
        /// Resource type (e.g. User, Group)
        resource_type: Option<String>,
    },
    /// Export the JSON schema for the configuration file
    ConfigSchema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracing(#[from] TracingError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to read {1}: {0}")]
    Io(std::io::Error, String),

    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[cfg_attr(feature = "json-schema", allow(dead_code))]
    #[error("{0}")]
    Unsupported(&'static str),
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Engine(err)) => {
            // Client input errors are reported the way an API would return them
            let body = ErrorResponse::from(&err);
            match serde_json::to_string_pretty(&body) {
                Ok(text) => eprintln!("{}", text),
                Err(_) => eprintln!("Error: {}", err),
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.logging)?;
    tracing::debug!(config = ?args.config, "Loaded configuration");

    match args.command {
        Command::Parse { filter } => run_parse(&config, &filter),
        Command::Translate {
            resource_type,
            filter,
        } => run_translate(&config, &resource_type, &filter),
        Command::Eval { filter, file } => run_eval(&config, &filter, file.as_deref()),
        Command::Trim {
            attributes,
            excluded_attributes,
            file,
        } => run_trim(
            attributes.as_deref(),
            excluded_attributes.as_deref(),
            file.as_deref(),
        ),
        Command::Schema { resource_type } => run_schema(&config, resource_type.as_deref()),
        Command::ConfigSchema { output } => run_config_schema(output),
    }
}

fn run_parse(config: &EngineConfig, filter: &str) -> Result<(), CliError> {
    let filter = parse_filter_with(filter, config.limits.parser_limits())
        .map_err(EngineError::from)?;
    println!("{}", filter);
    Ok(())
}

fn run_translate(config: &EngineConfig, resource_type: &str, filter: &str) -> Result<(), CliError> {
    let registry = config.registry()?;
    let schema = registry
        .get(resource_type)
        .ok_or_else(|| CliError::UnknownResourceType(resource_type.to_string()))?;

    let filter = parse_filter_with(filter, config.limits.parser_limits())
        .map_err(EngineError::from)?;
    let plan = SearchPlan::for_filter(Some(&filter), schema).map_err(EngineError::from)?;

    let output = json!({
        "resourceType": schema.resource_type(),
        "filter": filter.to_string(),
        "inMemory": matches!(plan, SearchPlan::InMemory(_)),
        "backend": plan.backend_filter(),
        "rendered": plan.backend_filter().map(ToString::to_string),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_eval(config: &EngineConfig, filter: &str, file: Option<&Path>) -> Result<(), CliError> {
    let filter = parse_filter_with(filter, config.limits.parser_limits())
        .map_err(EngineError::from)?;
    let input = read_json(file)?;

    let evaluator = Evaluator::new();
    let output = match input {
        Value::Array(mut candidates) => {
            evaluator.retain(&filter, &mut candidates);
            Value::Array(candidates)
        }
        document => Value::Bool(evaluator.matches(&filter, &document)),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_trim(
    attributes: Option<&str>,
    excluded_attributes: Option<&str>,
    file: Option<&Path>,
) -> Result<(), CliError> {
    let spec = ProjectionSpec::from_lists(attributes, excluded_attributes)
        .map_err(EngineError::from)?
        .with_always_returned(ALWAYS_RETURNED.iter().map(|name| AttrPath::build(None, *name)));
    let input = read_json(file)?;

    let output = match input {
        Value::Array(documents) => {
            Value::Array(documents.iter().map(|doc| trim(doc, &spec)).collect())
        }
        document => trim(&document, &spec),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_schema(config: &EngineConfig, resource_type: Option<&str>) -> Result<(), CliError> {
    let registry: SchemaRegistry = config.registry()?;

    let Some(resource_type) = resource_type else {
        let mut names: Vec<&str> = registry.resource_types().collect();
        names.sort_unstable();
        for name in names {
            println!("{}", name);
        }
        return Ok(());
    };

    let schema = registry
        .get(resource_type)
        .ok_or_else(|| CliError::UnknownResourceType(resource_type.to_string()))?;
    let attributes: Vec<Value> = schema
        .permitted()
        .map(|(path, mapping)| {
            json!({
                "path": path.to_string(),
                "field": mapping.backend_field,
                "type": mapping.type_tag,
                "tier": mapping.tier,
            })
        })
        .collect();
    let output = json!({
        "resourceType": schema.resource_type(),
        "attributes": attributes,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Export JSON schema for the configuration file to file or stdout
#[cfg(feature = "json-schema")]
fn run_config_schema(output: Option<String>) -> Result<(), CliError> {
    let content = EngineConfig::json_schema_string()?;

    match output {
        Some(path) => {
            std::fs::write(&path, &content).map_err(|e| CliError::Io(e, path.clone()))?;
            eprintln!("Config JSON schema written to {}", path);
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

#[cfg(not(feature = "json-schema"))]
fn run_config_schema(output: Option<String>) -> Result<(), CliError> {
    let _ = output;
    Err(CliError::Unsupported(
        "JSON schema export requires the 'json-schema' feature",
    ))
}

fn read_json(file: Option<&Path>) -> Result<Value, CliError> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| CliError::Io(e, path.display().to_string()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| CliError::Io(e, "stdin".to_string()))?;
            text
        }
    };
    Ok(serde_json::from_str(&text)?)
}
