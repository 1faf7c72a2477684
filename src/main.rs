use anyhow::{anyhow, Context, Result};
use chartpool::chart::ChartConfig;
use chartpool::document::{parse_documents, SourceRegistry};
use chartpool::embed::charts_to_value;
use chartpool::MemorySource;
use clap::{ArgAction, Parser};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "chartpool")]
#[command(about = "Pivot tabular data and emit chart options as JSON", long_about = None)]
struct Args {
    /// Chart document (a JSON object or array of objects). Reads stdin when omitted
    #[arg(short, long)]
    spec: Option<PathBuf>,

    /// Register a data source as NAME=PATH (.csv or .json)
    #[arg(long = "source", value_parser = parse_source)]
    sources: Vec<(String, PathBuf)>,

    /// Comma separated element ids assigned to the charts in order
    #[arg(long, default_value = "")]
    render_to: String,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_source(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", raw)),
    }
}

fn setup_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new().filter_level(log_level).init();
}

fn load_source(name: &str, path: &Path) -> Result<MemorySource> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") => MemorySource::from_csv_path(name, path),
        Some("json") => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse JSON in '{}'", path.display()))?;
            MemorySource::from_json(name, &value)
        }
        _ => Err(anyhow!(
            "Unsupported source file '{}': expected .csv or .json",
            path.display()
        )),
    }
}

fn read_spec(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read chart document '{}'", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read chart document from stdin")?;
            Ok(text)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let mut registry = SourceRegistry::new();
    for (name, path) in &args.sources {
        let source = load_source(name, path)
            .with_context(|| format!("Failed to load source '{}'", name))?;
        log::info!("registered source '{}' with {} rows", name, source.len());
        registry.register(name, source);
    }

    let text = read_spec(args.spec.as_deref())?;
    let documents = parse_documents(&text).context("Failed to parse chart document")?;

    let mut charts = Vec::with_capacity(documents.len());
    for (idx, document) in documents.iter().enumerate() {
        let chart = document
            .build(&registry)
            .with_context(|| format!("Failed to build chart {}", idx + 1))?;
        charts.push(chart);
    }

    let refs: Vec<&dyn ChartConfig> = charts.iter().map(|c| c as &dyn ChartConfig).collect();
    let output = charts_to_value(&refs, &args.render_to);
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .context("Failed to serialize charts")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", rendered).context("Failed to write charts to stdout")?;
    handle.flush().context("Failed to flush stdout")?;

    Ok(())
}
