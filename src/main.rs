//! Connector engine CLI entry point.
//!
//! Loads mapping documents from a config file and runs one execution,
//! printing the result envelope as JSON.

use anyhow::{bail, Context, Result};
use clap::Parser;
use connector_engine::{ConnectorConfig, ConnectorEngine, ExecutionContext};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "connector-engine")]
#[command(
    author,
    version,
    about = "Configuration-driven integration engine: map, authenticate and call target APIs"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, env = "CONNECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Mapping id or name to execute
    #[arg(long, env = "CONNECTOR_KEY")]
    connector: Option<String>,

    /// Inbound payload as JSON, or @path to read it from a file
    #[arg(short, long)]
    payload: Option<String>,

    /// Query parameter override (key=value), repeatable
    #[arg(long = "query", value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// Extra header for the target call (name=value), repeatable
    #[arg(long = "header", value_name = "NAME=VALUE")]
    header: Vec<String>,

    /// Override the target API method
    #[arg(long)]
    method: Option<String>,

    /// Bearer token to pass through to the target
    #[arg(long, env = "CONNECTOR_TOKEN")]
    token: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

fn print_example_config() {
    let example = r#"# Connector Engine Configuration Example
version: "1"

settings:
  # Timeout for every outbound call (ms)
  request_timeout_ms: 30000
  # Delay between retries when a mapping does not set retryDelayMs (ms)
  default_retry_delay_ms: 1000

mappings:
  # Order sync: reshape the order, call the ERP with OAuth2, map the reply
  - id: "order-sync"
    name: "orders"
    sourceSystem: "shop"
    targetSystem: "erp"
    requestMapping:
      type: OBJECT
      mappings:
        - source: "$.order.amount"
          target: "$.total"
          transform: roundTo2
        - source: "$.order.id"
          target: "$.reference"
          required: true
        - source: "$.order.priority"
          target: "$.priority"
          transform: uppercase
      defaults:
        "$.currency": "EUR"
    targetApi:
      url: "https://erp.example.com/api/orders/:orderId"
      method: PUT
      pathParams:
        orderId: "$.order.id"
      headers:
        X-Source: "shop"
      resilience:
        retryCount: 2
        retryDelayMs: 500
    authConfig:
      authType: OAUTH2
      config:
        tokenUrl: "https://idp.example.com/oauth/token"
        clientId: "shop-connector"
        clientSecret: "change-me"
        scope: "orders.write"
    responseMapping:
      type: OBJECT
      mappings:
        - source: "$.data.id"
          target: "$.erpId"
        - source: "$.data.state"
          target: "$.synced"
          condition: "$.data.state == 'ACCEPTED'"
          valueIfTrue: true
          valueIfFalse: false
    errorMapping:
      mappings:
        - source: "$.error.code"
          target: "$.errorCode"
        - source: "$.message"
          target: "$.errorMessage"

  # Country list: GET with API key, flatten the array
  - id: "countries"
    targetApi:
      url: "https://countries.example.com/v3/all"
      method: GET
      queryParams:
        fields: "name,cca2"
    authConfig:
      authType: API_KEY
      config:
        keyName: "apikey"
        keyValue: "change-me"
        location: QUERY
    responseMapping:
      type: ARRAY
      root: "$[*]"
      outputWrapper: "$.countries"
      mappings:
        - source: "$.name.common"
          target: "$.name"
        - source: "$.cca2"
          target: "$.code"
"#;
    println!("{}", example);
}

fn load_config(path: &Path) -> Result<ConnectorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?
    };
    Ok(config)
}

fn load_payload(raw: Option<&str>) -> Result<JsonValue> {
    let Some(raw) = raw else {
        return Ok(JsonValue::Null);
    };
    let content = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file: {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&content).context("Payload is not valid JSON")
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("Expected KEY=VALUE, got '{raw}'"),
    }
}

fn build_context(args: &Args) -> Result<ExecutionContext> {
    let mut ctx = ExecutionContext::new();
    for raw in &args.query {
        let (key, value) = split_pair(raw)?;
        ctx = ctx.with_query_param(key, value);
    }
    for raw in &args.header {
        let (name, value) = split_pair(raw)?;
        ctx = ctx.with_header(name, value);
    }
    if let Some(method) = &args.method {
        ctx = ctx.with_method(method.as_str());
    }
    if let Some(token) = &args.token {
        ctx = ctx.with_incoming_token(token.as_str());
    }
    Ok(ctx)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        print_example_config();
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ConnectorConfig::default(),
    };

    let engine = ConnectorEngine::from_config(config.clone())
        .context("Failed to initialize connector engine")?;

    if args.validate {
        let mut invalid = 0;
        for document in &config.mappings {
            if let Err(e) = engine.validate_document(document) {
                warn!(mapping = %document.id, error = %e, "Invalid mapping document");
                invalid += 1;
            }
        }
        if invalid > 0 {
            bail!("{invalid} of {} mapping documents are invalid", config.mappings.len());
        }
        info!(mappings = config.mappings.len(), "Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(connector) = args.connector.as_deref() else {
        bail!("--connector is required (or use --validate / --example-config)");
    };
    let payload = load_payload(args.payload.as_deref())?;
    let ctx = build_context(&args)?;

    info!(
        config = ?args.config,
        connector,
        correlation_id = %ctx.correlation_id,
        "Running connector"
    );

    let (envelope, code) = match engine.execute(connector, payload, ctx).await {
        Ok(output) => (output.envelope(), ExitCode::SUCCESS),
        Err(error) => (
            serde_json::to_value(error.envelope()).context("Failed to render error envelope")?,
            ExitCode::FAILURE,
        ),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).context("Failed to render result")?
    );

    Ok(code)
}
