mod error;
mod hints;
mod mapping;
mod oracle;
mod output;
mod pipeline;
mod prompt;
mod schema;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use hints::collect_hints;
use oracle::{CompletionOptions, DEFAULT_BASE_URL, DEFAULT_MODEL, OpenRouterOracle, Oracle};
use output::{OutputFormat, write_reports};
use pipeline::{MappingSettings, SupplierReport, process_all};
use schema::load_target_fields;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file listing the target fields (`field_name` and optional `description` columns)
    targets: PathBuf,

    /// Supplier CSV files; their header rows are the supplier fields
    #[arg(required = true)]
    suppliers: Vec<PathBuf>,

    /// Where to write the mapping tables (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Business-rule hint passed to the model, may be repeated
    #[arg(long = "hint")]
    hints: Vec<String>,

    /// File with one business-rule hint per line
    #[arg(long)]
    hints_file: Option<PathBuf>,

    /// API key for the completion endpoint
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completions API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model identifier
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.0)]
    temperature: f64,

    /// Maximum number of tokens in the model's answer
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Do not ask the endpoint to force a JSON answer
    #[arg(long)]
    no_json_mode: bool,

    /// Seconds to wait for the model before giving up on a supplier
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Number of suppliers processed at the same time
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Field delimiter of the supplier files
    #[arg(long, default_value_t = ',', value_parser = parse_delimiter)]
    delimiter: char,
}

fn parse_delimiter(value: &str) -> Result<char, String> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(format!("delimiter must be a single ASCII character, got '{value}'")),
    }
}

fn init_logging() {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let target_fields = load_target_fields(&args.targets)
        .context("Failed to load target fields")?;
    info!(count = target_fields.len(), "loaded target fields");

    let hints = collect_hints(args.hints_file.as_deref(), &args.hints)
        .context("Failed to load hints")?;
    if !hints.is_empty() {
        info!(count = hints.len(), "using business-rule hints");
    }

    let api_key = args
        .api_key
        .context("No API key: pass --api-key or set OPENROUTER_API_KEY")?;
    let oracle: Arc<dyn Oracle> =
        Arc::new(OpenRouterOracle::new(api_key, &args.base_url));

    let settings = MappingSettings {
        options: CompletionOptions {
            model: args.model,
            temperature: args.temperature,
            max_output_tokens: args.max_tokens,
            force_json_output: !args.no_json_mode,
        },
        timeout: Duration::from_secs(args.timeout),
        hints,
        delimiter: u8::try_from(args.delimiter)
            .context("Delimiter must be a single-byte character")?,
    };

    let total = args.suppliers.len();
    let outcomes = tokio::select! {
        outcomes = process_all(
            oracle,
            Arc::new(target_fields),
            args.suppliers,
            Arc::new(settings),
            args.concurrency,
        ) => outcomes,
        _ = signal::ctrl_c() => bail!("Interrupted, no mapping tables written"),
    };

    let mut reports: Vec<SupplierReport> = Vec::with_capacity(total);
    let mut failed: Vec<String> = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => reports.push(report),
            Err(_) => failed.push(outcome.path.display().to_string()),
        }
    }

    if reports.is_empty() {
        bail!("No supplier could be mapped");
    }

    write_reports(args.output.as_deref(), args.format, &reports)
        .context("Failed to write mapping tables")?;
    info!(written = reports.len(), failed = failed.len(), "done");

    if !failed.is_empty() {
        warn!(suppliers = ?failed, "some suppliers were not mapped");
        bail!("{} of {total} suppliers failed", failed.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(";"), Ok(';'));
        assert_eq!(parse_delimiter("\t"), Ok('\t'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from([
            "field-mapper",
            "targets.csv",
            "acme.csv",
            "globex.csv",
        ])
        .unwrap();

        assert_eq!(args.targets, PathBuf::from("targets.csv"));
        assert_eq!(args.suppliers.len(), 2);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.delimiter, ',');
        assert_eq!(args.timeout, 120);
        assert_eq!(args.model, DEFAULT_MODEL);
        assert!(args.hints.is_empty());
    }

    #[test]
    fn test_args_repeated_hints() {
        let args = Args::try_parse_from([
            "field-mapper",
            "--hint",
            "is_available is true when isStocked equals YES",
            "--hint",
            "price is in cents",
            "--format",
            "csv",
            "targets.csv",
            "acme.csv",
        ])
        .unwrap();

        assert_eq!(args.hints.len(), 2);
        assert_eq!(args.format, OutputFormat::Csv);
    }

    #[test]
    fn test_args_temperature_is_exact() {
        let args = Args::try_parse_from([
            "field-mapper",
            "--temperature",
            "0.7",
            "targets.csv",
            "acme.csv",
        ])
        .unwrap();

        assert_eq!(args.temperature.to_string(), "0.7");
    }

    #[test]
    fn test_args_require_a_supplier() {
        assert!(Args::try_parse_from(["field-mapper", "targets.csv"]).is_err());
    }
}
