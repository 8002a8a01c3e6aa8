use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use futures::future::join_all;
use sheetview::config::Config;
use sheetview::core::{cell_text, has_churn_column, Row};
use sheetview::services::{
    ColumnSummary, DashboardClient, PredictionRows, RowSource, SheetRows,
};
use sheetview::{PagedTable, ViewerEvent};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info};

/// Browse dashboard sheets page by page and summarize their columns
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum)]
    logging: Option<LogLevel>,
    /// Write the log here instead of ./sheetview.log
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Backend base URL (overrides the config file)
    #[arg(long = "api-url", value_name = "URL")]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(ClapArgs, Debug)]
struct PageArgs {
    file: String,
    sheet: String,
    /// Only show rows where some cell contains this text
    #[arg(long)]
    search: Option<String>,
    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pages: usize,
    /// Rows per page (defaults to the configured page size)
    #[arg(long = "page-size")]
    page_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List uploaded workbooks
    Files {
        /// Also list each workbook's sheets
        #[arg(long = "with-sheets")]
        with_sheets: bool,
    },
    /// List the sheets of a workbook
    Sheets { file: String },
    /// List the columns of a sheet
    Columns { file: String, sheet: String },
    /// Show sheet rows
    Preview(PageArgs),
    /// Show churn predictions for a sheet
    Predictions(PageArgs),
    /// Chart the value counts of a column
    Frequency {
        file: String,
        sheet: String,
        column: String,
        /// Bars kept before folding the rest into "Other"
        #[arg(long)]
        top: Option<usize>,
        /// Leave out the "Missing" bucket
        #[arg(long = "hide-missing")]
        hide_missing: bool,
        /// Tied labels listed before eliding
        #[arg(long)]
        tied: Option<usize>,
    },
    /// Delete an uploaded workbook
    Delete { file: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = args.logging.map(|l| match l {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    });
    sheetview::logging::init_with(args.log_file.clone(), level)?;

    let mut config = Config::from_path(args.config.as_ref())?;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    info!("Using backend {}", config.api_url);

    let res = run(args.command, &config).await;
    if let Err(e) = &res {
        error!("Error: {e}");
    }
    res
}

async fn run(command: Command, config: &Config) -> Result<()> {
    if let Command::Config = command {
        println!("{}", config.to_json5());
        return Ok(());
    }

    let client = DashboardClient::from_config(config)?;
    let mut out = io::stdout().lock();

    match command {
        Command::Files { with_sheets } => {
            let files = client.files().await?;
            if !with_sheets {
                for file in &files {
                    writeln!(out, "{file}")?;
                }
                return Ok(());
            }
            let sheets = join_all(files.iter().map(|f| client.sheets(f))).await;
            for (file, sheets) in files.iter().zip(sheets) {
                writeln!(out, "{file}")?;
                match sheets {
                    Ok(sheets) => {
                        for sheet in sheets {
                            writeln!(out, "  {sheet}")?;
                        }
                    }
                    Err(e) => writeln!(out, "  (sheets unavailable: {e})")?,
                }
            }
        }
        Command::Sheets { file } => {
            for sheet in client.sheets(&file).await? {
                writeln!(out, "{sheet}")?;
            }
        }
        Command::Columns { file, sheet } => {
            let columns = client.all_columns(&file, &sheet).await?;
            for column in &columns {
                writeln!(out, "{column}")?;
            }
            if has_churn_column(&columns) {
                writeln!(out, "(churn label present)")?;
            }
        }
        Command::Preview(page_args) => {
            let page_size = page_args.page_size.unwrap_or(config.page_size);
            let mut table = PagedTable::new(SheetRows::new(client), page_size);
            drive(&mut table, &page_args, &mut out).await?;
        }
        Command::Predictions(page_args) => {
            let page_size = page_args.page_size.unwrap_or(config.page_size);
            let mut table = PagedTable::new(PredictionRows::new(client), page_size);
            drive(&mut table, &page_args, &mut out).await?;
            if let Some(accuracy) = table.source().last_accuracy() {
                writeln!(out, "Model accuracy: {:.1}%", accuracy * 100.0)?;
            }
        }
        Command::Frequency { file, sheet, column, top, hide_missing, tied } => {
            let mut options = config.summary_options();
            options.top_k = top.unwrap_or(options.top_k);
            options.tied_shown = tied.unwrap_or(options.tied_shown);
            options.include_missing = options.include_missing && !hide_missing;

            let map = client.column_frequency(&file, &sheet, &column).await?;
            let summary = ColumnSummary::build(&map, &options);
            print_summary(&mut out, &column, &summary)?;
        }
        Command::Delete { file } => {
            let message = client.delete_file(&file).await?;
            writeln!(out, "{message}")?;
        }
        Command::Config => unreachable!("handled above"),
    }
    Ok(())
}

/// Act as the display layer for one viewer: select, optionally search, then
/// keep signalling "near bottom" until enough pages are shown.
async fn drive<S: RowSource>(
    table: &mut PagedTable<S>,
    args: &PageArgs,
    out: &mut impl Write,
) -> Result<()> {
    if !table.select_target(&args.file, &args.sheet) {
        bail!("file and sheet must both be given");
    }
    let mut failed = report(table.settle_all().await);

    if let Some(term) = &args.search {
        table.set_search_input(term);
        if !table.submit_search(term) {
            bail!("search term is blank");
        }
        failed = report(table.settle_all().await);
    }

    while !failed && table.state().current_page < args.pages && table.near_bottom() {
        failed = report(table.settle_all().await);
    }

    if table.rows().is_empty() {
        writeln!(out, "No data found")?;
        return Ok(());
    }
    print_rows(out, table.columns(), table.rows())?;
    let state = table.state();
    eprintln!(
        "page {}/{} ({} rows, {} mode)",
        state.current_page,
        state.total_pages,
        state.rows.len(),
        state.mode
    );
    Ok(())
}

/// Print failures to stderr; true when any fetch failed
fn report(events: Vec<ViewerEvent>) -> bool {
    let mut failed = false;
    for event in events {
        if let ViewerEvent::LoadFailed { page, error } = event {
            eprintln!("page {page} failed: {error}");
            failed = true;
        }
    }
    failed
}

const MAX_CELL_WIDTH: usize = 40;
const BAR_WIDTH: usize = 40;

fn print_rows(out: &mut impl Write, columns: &[String], rows: &[Row]) -> Result<()> {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(cell_text).unwrap_or_default())
                .map(|s| clip(&s, MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(clip(c, MAX_CELL_WIDTH).chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = columns.iter().map(|c| clip(c, MAX_CELL_WIDTH)).collect();
    write_line(out, &header, &widths)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(out, &rule, &widths)?;
    for row in &cells {
        write_line(out, row, &widths)?;
    }
    Ok(())
}

fn write_line(out: &mut impl Write, cells: &[String], widths: &[usize]) -> Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}", w = *w))
        .collect::<Vec<_>>()
        .join(" | ");
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut clipped: String = s.chars().take(max.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn print_summary(out: &mut impl Write, column: &str, summary: &ColumnSummary) -> Result<()> {
    if summary.is_empty() {
        writeln!(out, "No data to display for {column}.")?;
        return Ok(());
    }
    let label_width = summary
        .series
        .iter()
        .map(|e| e.label.chars().count())
        .max()
        .unwrap_or(0);
    let peak = summary
        .series
        .iter()
        .map(|e| e.count)
        .filter(|c| c.is_finite())
        .fold(0.0_f64, f64::max);

    for entry in &summary.series {
        let bar = if peak > 0.0 && entry.count.is_finite() {
            ((entry.count / peak) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        writeln!(
            out,
            "{:<label_width$} {:>8} {}",
            entry.label,
            entry.count,
            "#".repeat(bar)
        )
        .map_err(|e| eyre!("failed to write chart: {e}"))?;
    }
    writeln!(out)?;
    writeln!(out, "Highest {column}: {}", summary.highest)?;
    writeln!(out, "Lowest {column}: {}", summary.lowest)?;
    Ok(())
}
