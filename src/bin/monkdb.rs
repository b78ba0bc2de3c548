//! monkdb: command line client for MonkDB
//!
//! # Usage
//!
//! ```bash
//! # Execute a statement
//! monkdb "SELECT name FROM sys.nodes"
//!
//! # With parameters, against two nodes
//! monkdb "SELECT * FROM users WHERE id = ?" --bind 42 --servers http://db1:4200,http://db2:4200
//!
//! # Blobs
//! monkdb blob-put images ./cat.png
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use monkdb::prelude::*;
use monkdb::BlobContainer;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monkdb")]
#[command(version)]
#[command(about = "MonkDB command line client", long_about = None)]
#[command(after_help = "EXAMPLES:
    monkdb 'SELECT name, hostname FROM sys.nodes'
    monkdb 'SELECT * FROM users WHERE id = ?' --bind 42
    monkdb 'INSERT INTO t (a, b) VALUES (?, ?)' --bind 1,true --format json")]
struct Cli {
    /// The SQL statement to execute
    query: Option<String>,

    /// Positional parameter bindings
    #[arg(short, long, value_delimiter = ',')]
    bind: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Server URLs, overriding the config file
    #[arg(long, env = "MONKDB_SERVERS", value_delimiter = ',')]
    servers: Vec<String>,

    /// Config file (defaults to <config dir>/monkdb/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file to a blob container
    BlobPut {
        container: String,
        file: PathBuf,
    },
    /// Download a blob by digest
    BlobGet {
        container: String,
        digest: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the column type codes
    Types,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Some(Commands::Types) => {
            show_types();
            Ok(())
        }
        Some(Commands::BlobPut { container, file }) => blob_put(&cli, container, file).await,
        Some(Commands::BlobGet {
            container,
            digest,
            output,
        }) => blob_get(&cli, container, digest, output.as_ref()).await,
        None => match &cli.query {
            Some(query) => execute_query(query, &cli).await,
            None => {
                println!("{}", "MonkDB command line client".cyan().bold());
                println!();
                println!("Usage: monkdb <SQL> [OPTIONS]");
                println!();
                println!("Try: monkdb --help");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(trace) = e.downcast_ref::<MonkError>().and_then(MonkError::trace) {
            eprintln!("{}", trace.dimmed());
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "monkdb=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(cli: &Cli) -> anyhow::Result<ClientOptions> {
    let mut options = match &cli.config {
        Some(path) => ClientOptions::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientOptions::load_default()?,
    };
    if !cli.servers.is_empty() {
        options = options.servers(cli.servers.iter().cloned());
    }
    options.validate()?;
    Ok(options)
}

async fn execute_query(query: &str, cli: &Cli) -> anyhow::Result<()> {
    let options = load_options(cli)?;
    if cli.verbose {
        println!("{} {}", "Servers:".dimmed(), options.servers.join(", "));
        println!("{} {}", "Statement:".dimmed(), query.yellow());
    }

    let conn = Connection::connect(options)?;
    let mut cursor = conn.cursor()?;
    let params: Vec<JsonValue> = cli.bind.iter().map(|b| parse_binding(b)).collect();
    cursor.execute(query, &params).await?;

    let columns: Vec<String> = cursor.columns().into_iter().map(String::from).collect();
    let rowcount = cursor.rowcount();
    let rows = cursor.fetch_all();
    conn.close().await;

    if columns.is_empty() {
        println!("{} {} rows affected", "✓".green(), rowcount);
        return Ok(());
    }
    format_output(&columns, &rows, &cli.format);
    Ok(())
}

/// Bindings are typed by shape: integer, float, bool, then text.
fn parse_binding(binding: &str) -> JsonValue {
    if let Ok(n) = binding.parse::<i64>() {
        JsonValue::from(n)
    } else if let Ok(f) = binding.parse::<f64>() {
        JsonValue::from(f)
    } else if binding == "true" {
        JsonValue::Bool(true)
    } else if binding == "false" {
        JsonValue::Bool(false)
    } else {
        JsonValue::from(binding)
    }
}

fn format_output(columns: &[String], rows: &[Row], format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            let objects: Vec<JsonValue> = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .cloned()
                        .zip(row.iter().map(Value::to_json))
                        .collect::<serde_json::Map<_, _>>()
                        .into()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects).unwrap_or_default());
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "(no results)".dimmed());
                return;
            }

            let cells: Vec<Vec<String>> = rows
                .iter()
                .map(|row| row.iter().map(Value::to_string).collect())
                .collect();
            let widths: Vec<usize> = columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    cells
                        .iter()
                        .filter_map(|r| r.get(i).map(String::len))
                        .fold(c.len(), usize::max)
                })
                .collect();

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &cells {
                let line: Vec<String> = row
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:width$}", v, width = *w))
                    .collect();
                println!("{}", line.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
}

async fn blob_put(cli: &Cli, container: &str, file: &PathBuf) -> anyhow::Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let client = Arc::new(Client::new(load_options(cli)?)?);
    let digest = BlobContainer::new(container, client).put(data).await?;
    println!("{} {}", "✓".green(), digest.cyan());
    Ok(())
}

async fn blob_get(
    cli: &Cli,
    container: &str,
    digest: &str,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let client = Arc::new(Client::new(load_options(cli)?)?);
    let data = BlobContainer::new(container, client).get(digest).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{} Wrote {} bytes to {}", "✓".green(), data.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&data)?;
        }
    }
    Ok(())
}

fn show_types() {
    println!("{}", "MonkDB column types".cyan().bold());
    println!();
    println!("{:6} {}", "Code".white().bold(), "Type".white().bold());
    println!("{}", "─".repeat(32).dimmed());
    for kind in DataType::ALL {
        println!("{:6} {}", kind.code().to_string().yellow(), kind);
    }
}
