//! sqlassoc: compile criteria to SQL and run join requests.
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL for a find
//! sqlassoc --schema models.toml compile users '{"where": {"age": {">": 18}}}'
//!
//! # Show the parent query and the fan-out batches of a join request
//! sqlassoc --schema models.toml fanout users '{"instructions": {...}}' --ids 1,2,3
//!
//! # Introspect a table
//! sqlassoc --schema models.toml --url mysql://app@localhost/app describe users
//!
//! # Run a find or join request
//! sqlassoc --schema models.toml --url sqlite://app.db run users '{"limit": 5}'
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde_json::Value;
use sqlassoc::prelude::*;
use sqlassoc::transpiler::FanoutQuery;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlassoc")]
#[command(version)]
#[command(about = "Criteria-to-SQL compiler and association population engine", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlassoc --schema models.toml compile users '{\"where\": {\"id\": 1}}'
    sqlassoc --schema models.toml --db-type oracle fanout users @join.json --ids 1,2
    sqlassoc --schema models.toml --url sqlite://app.db run users '{\"limit\": 5}'")]
struct Cli {
    /// Collection definitions (TOML or JSON)
    #[arg(short, long, env = "SQLASSOC_SCHEMA")]
    schema: PathBuf,

    /// Connection config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database connection URL, overrides the config file
    #[arg(long, env = "SQLASSOC_DATABASE_URL")]
    url: Option<String>,

    /// Dialect, overrides the config file
    #[arg(long)]
    db_type: Option<DialectKind>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log every statement
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SELECT a find would run
    Compile {
        collection: String,
        /// Criteria as JSON, or @path to read it from a file
        criteria: Option<String>,
    },
    /// Print the parent query and the fan-out batches of a join request
    Fanout {
        collection: String,
        /// Criteria with `instructions`, as JSON or @path
        criteria: String,
        /// Parent key values to batch over
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Introspect the table behind a collection
    Describe { collection: String },
    /// Run a find or join request and print the records
    Run {
        collection: String,
        /// Criteria as JSON, or @path
        criteria: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "sqlassoc=info" } else { "sqlassoc=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let registry = load_registry(&cli.schema)?;
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Compile { collection, criteria } => {
            let dialect = config.db_type.build();
            let compiler = Compiler::new(dialect.as_ref(), &registry);
            let criteria = read_criteria(criteria.as_deref())?;
            let stmt = compiler.compile_select(collection, &criteria, false)?;
            print_statement("Generated SQL:", &stmt);
        }
        Commands::Fanout { collection, criteria, ids } => {
            let dialect = config.db_type.build();
            let compiler = Compiler::new(dialect.as_ref(), &registry);
            let criteria = read_criteria(Some(criteria))?;
            explain_fanout(&compiler, collection, &criteria, ids)?;
        }
        Commands::Describe { collection } => {
            let connection = Connection::connect(config, registry).await?;
            match connection.describe(collection).await? {
                Some(schema) => print_schema(&schema),
                None => println!("{}", "(table does not exist)".dimmed()),
            }
        }
        Commands::Run { collection, criteria } => {
            let criteria = read_criteria(criteria.as_deref())?;
            let connection = Connection::connect(config, registry).await?;
            let records = connection.find(collection, criteria).await?;
            format_output(&records, &cli.format);
        }
    }

    Ok(())
}

fn load_registry(path: &PathBuf) -> Result<Registry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    let registry = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Registry::from_json_str(&content)?,
        _ => Registry::from_toml_str(&content)?,
    };
    Ok(registry)
}

fn load_config(cli: &Cli) -> Result<ConnectionConfig> {
    let mut config = match &cli.config {
        Some(path) => ConnectionConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ConnectionConfig::load_default()?,
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(kind) = cli.db_type {
        config.db_type = kind;
    }
    config.log_queries |= cli.verbose;
    Ok(config)
}

fn read_criteria(arg: Option<&str>) -> Result<Criteria> {
    let Some(arg) = arg else {
        return Ok(Criteria::new());
    };
    let text = match arg.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading criteria {path}"))?
        }
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("parsing criteria")
}

fn parse_id(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        Value::from(n)
    } else {
        Value::from(raw)
    }
}

fn explain_fanout(
    compiler: &Compiler<'_>,
    collection: &str,
    criteria: &Criteria,
    ids: &[String],
) -> Result<()> {
    if criteria.instructions.is_empty() {
        bail!("criteria has no population instructions");
    }
    let parent = compiler.collection(collection)?;
    let normalized = compiler.normalize_criteria(collection, criteria)?;
    let (parent_stmt, _) = compiler.compile_joined_select(parent, &normalized)?;
    print_statement("Parent query:", &parent_stmt);

    let ids: Vec<Value> = ids.iter().map(|raw| parse_id(raw)).collect();
    for instruction in &normalized.instructions {
        if instruction.strategy() == Strategy::OneToOne {
            println!();
            println!(
                "{} {}",
                instruction.attribute.cyan(),
                "(joined into the parent query)".dimmed()
            );
            continue;
        }
        let query = FanoutQuery::new(instruction, parent, ids.clone())?;
        println!();
        match compiler.compile_fanout(&query)? {
            Some(fanout) => {
                let title = format!("{} ({}):", instruction.attribute, fanout.table);
                print_statement(&title, &fanout.statement);
                if !fanout.hidden_columns.is_empty() {
                    println!("  {} {}", "Stripped:".dimmed(), fanout.hidden_columns.join(", "));
                }
            }
            None => println!(
                "{} {}",
                instruction.attribute.cyan(),
                "(no parent ids, nothing to fetch)".dimmed()
            ),
        }
    }
    Ok(())
}

fn print_statement(title: &str, stmt: &Statement) {
    println!("{}", title.green().bold());
    println!("  {}", stmt.sql.white());
    if !stmt.params.is_empty() {
        println!("{}", "  Bindings:".cyan());
        for (i, p) in stmt.params.iter().enumerate() {
            println!("    {} = {}", i + 1, val_to_string(p).yellow());
        }
    }
}

fn print_schema(schema: &TableSchema) {
    println!(
        "{:24} {:14} {:8} {:8} {:8} {}",
        "Column".white().bold(),
        "Type".white().bold(),
        "PK".white().bold(),
        "Unique".white().bold(),
        "Index".white().bold(),
        "Default".white().bold()
    );
    println!("{}", "─".repeat(80).dimmed());
    for column in &schema.columns {
        let flag = |on: bool| if on { "yes" } else { "" };
        println!(
            "{:24} {:14} {:8} {:8} {:8} {}",
            column.name.cyan(),
            column.data_type.yellow(),
            flag(column.primary_key),
            flag(column.unique),
            flag(column.indexed),
            column.default.as_ref().map(val_to_string).unwrap_or_default().dimmed()
        );
    }
}

fn format_output(results: &[Row], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns: Vec<&String> = results[0].keys().collect();

            let mut widths: HashMap<&String, usize> = columns.iter().map(|c| (*c, c.len())).collect();
            for row in results {
                for (col, val) in row {
                    let len = val_to_string(val).chars().count();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[*c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[*c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[*c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} record(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &Value) -> String {
    match val {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} item(s)]", items.len()),
        _ => val.to_string(),
    }
}
