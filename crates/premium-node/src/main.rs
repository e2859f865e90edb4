use chrono::Local;
use clap::Parser;
use premium_common::symbols::load_symbols_file;
use premium_common::{ContractType, PremiumError, RunConfig};
use premium_node::{export, PremiumPipeline};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "premium-node")]
#[command(about = "Delta-targeted option premium table for the next weekly expiration")]
struct Cli {
    /// Contract type: call or put
    #[arg(long = "type")]
    contract_type: ContractType,

    /// Symbol list, one `SYM[,shares]` per line
    #[arg(long, default_value = "symbols.txt")]
    symbols: PathBuf,

    /// Optional TOML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wide table output
    #[arg(long, default_value = "premiums.csv")]
    csv_out: PathBuf,

    /// Per-delta detail output
    #[arg(long, default_value = "details.csv")]
    details_out: PathBuf,

    /// JSON records output
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Print the JSON records to stdout
    #[arg(long)]
    emit_json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn exit_code(err: &PremiumError) -> ExitCode {
    match err {
        PremiumError::Configuration(_) => ExitCode::from(1),
        PremiumError::Input(_) => ExitCode::from(2),
        _ => ExitCode::from(3),
    }
}

async fn run(cli: Cli) -> Result<(), PremiumError> {
    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    let pipeline = PremiumPipeline::from_env(&config)?;
    let symbols = load_symbols_file(&cli.symbols)?;
    info!("Loaded {} symbols from {}", symbols.len(), cli.symbols.display());

    let today = Local::now().date_naive();
    let rows = pipeline
        .generate(&symbols, &config.target_deltas, cli.contract_type, today)
        .await?;

    if rows.is_empty() {
        return Err(PremiumError::Input("no rows produced".to_string()));
    }

    let exported = export::write_wide_file(&cli.csv_out, &rows, &config.target_deltas)
        .and_then(|_| export::write_details_file(&cli.details_out, &rows))
        .and_then(|_| match &cli.json_out {
            Some(path) => export::write_json_file(path, &rows),
            None => Ok(()),
        })
        .and_then(|_| {
            if cli.emit_json {
                export::write_json(io::stdout().lock(), &rows)
            } else {
                Ok(())
            }
        });

    exported.map_err(|e| match e {
        PremiumError::Export(_) => e,
        other => PremiumError::Export(other.to_string()),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_code(&e)
        }
    }
}
