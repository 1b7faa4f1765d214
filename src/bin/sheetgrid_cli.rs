//! CLI tool for sheetgrid - ingests a sheet and outputs the table as JSON
//!
//! Usage:
//!   sheetgrid_cli invoice.xlsx                        # Full table to stdout
//!   sheetgrid_cli invoice.csv -o table.json           # Full table to file
//!   sheetgrid_cli invoice.xlsx --window --scroll 3600 # Only the rows a 600px viewport shows
//!   sheetgrid_cli invoice.xlsx --set 0:total_qty=12   # Apply edits before printing

use clap::Parser;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use sheetgrid::{CellValue, EngineConfig, GridError, SheetGrid};

#[derive(Debug, Parser)]
#[command(name = "sheetgrid_cli", version, about = "Ingest a spreadsheet and print the table as JSON")]
struct Cli {
    /// Input file (.xlsx, .csv or .tsv)
    input: PathBuf,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print only the virtualized window instead of the whole table
    #[arg(long)]
    window: bool,

    /// Scroll offset in pixels used with --window
    #[arg(long, default_value_t = 0.0)]
    scroll: f64,

    /// Edit to apply before printing, as ROW:COLUMN=VALUE (repeatable)
    #[arg(long = "set", value_name = "ROW:COLUMN=VALUE")]
    edits: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sheetgrid={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Parse `ROW:COLUMN=VALUE`.
fn parse_edit(spec: &str) -> Result<(usize, String, CellValue), GridError> {
    let invalid = || GridError::Other(format!("Invalid edit {spec:?}, expected ROW:COLUMN=VALUE"));
    let (target, value) = spec.split_once('=').ok_or_else(invalid)?;
    let (row, column) = target.split_once(':').ok_or_else(invalid)?;
    let row = row.trim().parse::<usize>().map_err(|_| invalid())?;
    Ok((row, column.to_string(), CellValue::from_input(value)))
}

fn run(cli: &Cli) -> Result<String, GridError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    let data = fs::read(&cli.input)?;
    let file_name = cli.input.file_name().and_then(|n| n.to_str());

    let mut grid = SheetGrid::with_config(config);
    grid.load_file(&data, file_name)?;

    for spec in &cli.edits {
        let (row, column, value) = parse_edit(spec)?;
        let outcome = grid.update_cell(row, &column, value)?;
        tracing::info!(row, column = %column, ?outcome, "applied edit");
    }

    let json = if cli.window {
        grid.set_scroll(cli.scroll);
        serde_json::to_string_pretty(&grid.rows_in_window())?
    } else {
        serde_json::to_string_pretty(&*grid.store().snapshot())?
    };
    Ok(json)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = match run(&cli) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let written = match &cli.output {
        Some(path) => fs::write(path, &json).map(|()| eprintln!("Written: {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(json.as_bytes())
                .and_then(|()| writeln!(stdout))
        }
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit() {
        let (row, column, value) = parse_edit("3:Total Qty=12").unwrap();
        assert_eq!(row, 3);
        assert_eq!(column, "Total Qty");
        assert_eq!(value, CellValue::Number(12.0));
    }

    #[test]
    fn test_parse_edit_rejects_garbage() {
        assert!(parse_edit("total_qty=1").is_err());
        assert!(parse_edit("x:total_qty=1").is_err());
        assert!(parse_edit("1:total_qty").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
