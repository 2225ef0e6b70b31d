use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use sv_app::{
    AppError, AppResult, ConvertOptions, ConvertProgress, ConvertWorker, HeatmapSummary,
    RunDetail, Settings, TableConverter, WorkerMessage, build_summary, default_store_path,
    list_variables, spawn_drill_down,
};
use sv_core::{ColorRamp, Rgb, plan};
use sv_store::{RunStore, digest};

#[derive(Parser)]
#[command(name = "simviz")]
#[command(about = "simviz - convert parameter-sweep tables and browse them as heatmaps", long_about = None)]
struct Cli {
    /// Settings YAML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a BehaviorSpace table CSV into a run store
    Convert {
        /// Path to the CSV table
        csv_path: PathBuf,
        /// Store directory (defaults to the CSV path with the store extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replace an existing store
        #[arg(long)]
        force: bool,
    },
    /// List the variables recorded in a store
    Variables {
        /// Store directory
        store_path: PathBuf,
    },
    /// Show the heatmap of one variable across all runs
    Heatmap {
        /// Store directory
        store_path: PathBuf,
        /// Variable path, e.g. "/count sheep"
        variable: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// Print hex codes instead of coloured tiles
        #[arg(long)]
        plain: bool,
    },
    /// Show every series of one run
    Drill {
        /// Store directory
        store_path: PathBuf,
        /// Run id
        run_id: String,
        /// Only export this variable
        #[arg(long)]
        variable: Option<String>,
        /// Output CSV file path (optional, defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the attributes of one run
    Attributes {
        /// Store directory
        store_path: PathBuf,
        /// Run id
        run_id: String,
    },
    /// Show store metadata and content digest
    Inspect {
        /// Store directory
        store_path: PathBuf,
    },
    /// Print the grid layout planned for `n` runs
    Grid {
        /// Number of runs
        n: usize,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert {
            csv_path,
            output,
            force,
        } => cmd_convert(&settings, &csv_path, output, force),
        Commands::Variables { store_path } => cmd_variables(&store_path),
        Commands::Heatmap {
            store_path,
            variable,
            json,
            plain,
        } => cmd_heatmap(&settings, &store_path, &variable, json, plain),
        Commands::Drill {
            store_path,
            run_id,
            variable,
            output,
        } => cmd_drill(&store_path, &run_id, variable.as_deref(), output.as_deref()),
        Commands::Attributes { store_path, run_id } => cmd_attributes(&store_path, &run_id),
        Commands::Inspect { store_path } => cmd_inspect(&store_path),
        Commands::Grid { n } => cmd_grid(n),
    }
}

fn cmd_convert(
    settings: &Settings,
    csv_path: &Path,
    output: Option<PathBuf>,
    force: bool,
) -> AppResult<()> {
    let store_path =
        output.unwrap_or_else(|| default_store_path(csv_path, &settings.store_extension));
    println!(
        "Converting {} -> {}",
        csv_path.display(),
        store_path.display()
    );

    let mut options = ConvertOptions {
        writer: settings.writer_options(),
    };
    options.writer.overwrite |= force;

    let started = Instant::now();
    let mut worker =
        ConvertWorker::start(TableConverter::default(), csv_path, &store_path, options)?;
    let summary = loop {
        match worker.poll() {
            Some(WorkerMessage::Progress(event)) => {
                render_cli_progress(&event, started.elapsed().as_secs_f64())
            }
            Some(WorkerMessage::Complete(summary)) => break summary,
            Some(WorkerMessage::Failed { message }) => {
                clear_progress_line();
                return Err(AppError::Worker(message));
            }
            None => std::thread::sleep(settings.poll_interval()),
        }
    };
    clear_progress_line();

    println!("✓ Conversion completed: {}", summary.store_path.display());
    println!("  Rows: {}", summary.rows);
    println!("  Runs: {}", summary.runs);
    println!("  Variables: {}", summary.manifest.variables.len());
    println!("  Elapsed: {:.3}s", summary.elapsed_wall_s);
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &ConvertProgress, elapsed_s: f64) {
    match event.fraction_complete() {
        Some(fraction) => {
            let width = 28usize;
            let filled = ((fraction * width as f64).round() as usize).min(width);
            let bar = format!(
                "{}{}",
                "#".repeat(filled),
                "-".repeat(width.saturating_sub(filled))
            );
            print!(
                "\r[{}] {:>6.2}%  stage={}  row={}/{}  runs={}  elapsed={:.1}s",
                bar,
                fraction * 100.0,
                event.stage.label(),
                event.row,
                event.total.unwrap_or(event.row),
                event.runs,
                elapsed_s
            );
        }
        None => {
            let spinner = ['|', '/', '-', '\\'];
            let spin_idx = event.row % spinner.len();
            print!(
                "\r{} {}  row={}  runs={}  elapsed={:.1}s",
                spinner[spin_idx],
                event.stage.label(),
                event.row,
                event.runs,
                elapsed_s
            );
        }
    }
    let _ = io::stdout().flush();
}

fn cmd_variables(store_path: &Path) -> AppResult<()> {
    let store = RunStore::open(store_path)?;
    let variables = list_variables(&store);

    if variables.is_empty() {
        println!("No variables found in store");
    } else {
        println!("Variables in store:");
        for variable in variables {
            println!("  /{}", variable);
        }
    }
    Ok(())
}

fn cmd_heatmap(
    settings: &Settings,
    store_path: &Path,
    variable: &str,
    json: bool,
    plain: bool,
) -> AppResult<()> {
    let store = RunStore::open(store_path)?;
    let ramp = settings.ramp()?;
    let summary = build_summary(&store, variable, &ramp)?;

    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "Heatmap of /{} ({} runs, {} x {})",
        summary.variable,
        summary.cells.len(),
        summary.layout.row_count(),
        summary.layout.column_count()
    );
    print_tiles(&summary, plain);
    print_colorbar(&summary, &ramp, plain)?;

    println!("\nRuns:");
    for cell in &summary.cells {
        println!(
            "  ({}, {})  run {}  {}  {}",
            cell.row, cell.column, cell.run_id, cell.value, cell.color
        );
    }
    Ok(())
}

fn swatch(color: Rgb) -> String {
    format!(
        "\x1b[48;2;{};{};{}m    \x1b[0m",
        color.r, color.g, color.b
    )
}

fn print_tiles(summary: &HeatmapSummary, plain: bool) {
    for row in summary.grid() {
        let mut line = String::from("  ");
        for cell in row {
            match (cell, plain) {
                (Some(cell), false) => line.push_str(&swatch(cell.color)),
                (Some(cell), true) => line.push_str(&format!("{} ", cell.color)),
                (None, false) => line.push_str("    "),
                (None, true) => line.push_str(".       "),
            }
        }
        println!("{}", line.trim_end());
    }
}

fn print_colorbar(summary: &HeatmapSummary, ramp: &ColorRamp, plain: bool) -> AppResult<()> {
    if summary.degenerate {
        println!("\nAll runs share the value {}", summary.min);
    }
    println!("\nColorbar:");
    for entry in summary.colorbar(ramp)? {
        if plain {
            println!("  {}  {:.4}", entry.color, entry.value);
        } else {
            println!("  {}  {:.4}", swatch(entry.color), entry.value);
        }
    }
    Ok(())
}

fn cmd_drill(
    store_path: &Path,
    run_id: &str,
    variable: Option<&str>,
    output: Option<&Path>,
) -> AppResult<()> {
    let detail = spawn_drill_down(store_path, run_id)?.wait()?;

    let columns: Vec<&str> = match variable {
        Some(variable) => {
            let variable = variable.trim_start_matches('/');
            if detail.series(variable).is_none() {
                return Err(AppError::VariableNotFound(variable.to_string()));
            }
            vec![variable]
        }
        None => detail.series.iter().map(|s| s.variable.as_str()).collect(),
    };

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            write_series_csv(&detail, &columns, file)?;
            println!(
                "✓ Exported {} samples of run {} to {}",
                detail.sample_count(),
                detail.run_id,
                path.display()
            );
        }
        None => {
            print!("{}", detail.attribute_text());
            println!();
            write_series_csv(&detail, &columns, io::stdout().lock())?;
        }
    }
    Ok(())
}

/// One row per sample: the tick, then one column per variable.
fn write_series_csv<W: Write>(detail: &RunDetail, columns: &[&str], out: W) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["tick".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));
    writer.write_record(&header)?;

    let series: Vec<_> = columns
        .iter()
        .filter_map(|c| detail.series(c))
        .collect();
    for i in 0..detail.sample_count() {
        let tick = series
            .first()
            .map(|s| s[i].tick.to_string())
            .unwrap_or_default();
        let mut record = vec![tick];
        record.extend(series.iter().map(|s| s[i].value.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn cmd_attributes(store_path: &Path, run_id: &str) -> AppResult<()> {
    let store = RunStore::open(store_path)?;
    let attributes = store.attributes(run_id)?;

    println!("Attributes of run {}:", attributes.run_id);
    for attribute in &attributes.attributes {
        println!("  {}: {}", attribute.name, attribute.value);
    }
    Ok(())
}

fn cmd_inspect(store_path: &Path) -> AppResult<()> {
    let store = RunStore::open(store_path)?;
    let manifest = store.manifest();

    println!("Store: {}", store.path().display());
    println!("  Format version: {}", manifest.format_version);
    println!("  Source: {}", manifest.source_file);
    println!("  Rows consumed: {}", manifest.rows_consumed);
    println!("  Attributes: {}", manifest.attribute_names.len());
    println!("  Variables: {}", manifest.variables.len());
    println!("  Runs: {}", manifest.runs.len());
    if let Some(run_id) = manifest.runs.first() {
        for variable in &manifest.variables {
            println!(
                "    /{}: {} samples in run {}",
                variable,
                store.series_len(run_id, variable)?,
                run_id
            );
        }
    }
    println!("  Digest: {}", digest(&store)?);
    Ok(())
}

fn cmd_grid(n: usize) -> AppResult<()> {
    let layout = plan(n)?;
    println!(
        "{} items in {} rows x {} columns ({} padding)",
        layout.filled_count(),
        layout.row_count(),
        layout.column_count(),
        layout.padding_count()
    );
    for row in layout.rows() {
        println!("  ({}, {})", row.filled, row.padding);
    }
    print!("{}", layout);
    Ok(())
}
