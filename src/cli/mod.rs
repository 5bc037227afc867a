use crate::audit::AuditLogger;
use crate::scanner::DatasetFile;
use crate::scrubber::{describe_outcome, FileStatus, ScrubOptions, ScrubResult};
use crate::utils::{format_columns, format_size};
use crate::{Config, Scanner, Scrubber};
use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use prettytable::{format, Cell, Row, Table as PrettyTable};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dataset-scrubber")]
#[command(version, about = "Strip auto-generated \"Unnamed\" index columns from zipped CSV datasets", long_about = None)]
pub struct Cli {
    /// Defaults to `scrub` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct ScrubArgs {
    /// Directory to scan (defaults to `root_dir` from config, `../datasets`)
    pub path: Option<PathBuf>,

    /// Maximum scan depth
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Dry run - report what would be removed without rewriting
    #[arg(long)]
    pub dry_run: bool,

    /// Stop at the first dataset that fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Rewrite files in place instead of via temporary file and rename
    #[arg(long)]
    pub no_atomic: bool,

    /// Prefix rewritten tables with a blank-headed row index column
    #[arg(long)]
    pub write_index: bool,

    /// Output the run result as JSON
    #[arg(long)]
    pub json: bool,

    /// Don't draw the progress line
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Remove unnamed index columns from every .csv.zip dataset
    Scrub(ScrubArgs),

    /// List the datasets that would be processed
    Scan {
        /// Directory to scan
        path: Option<PathBuf>,

        /// Maximum scan depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate default config file
    InitConfig {
        /// Output path for config file
        path: Option<PathBuf>,
    },

    /// Query audit logs
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List recent runs
    List {
        /// Show only top N runs
        #[arg(long, default_value = "20")]
        top: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show all records for a run
    Show {
        /// Run id
        #[arg(long)]
        run: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = if let Some(config_path) = &self.config {
            Config::load(config_path)?
        } else {
            Config::load_or_default(Config::default_path())?
        };

        match self.command {
            None => run_scrub(ScrubArgs::default(), &config)?,
            Some(Commands::Scrub(args)) => run_scrub(args, &config)?,
            Some(Commands::Scan { path, depth, json }) => run_scan(path, depth, json, &config)?,
            Some(Commands::InitConfig { path }) => init_config(path)?,
            Some(Commands::Audit { command }) => run_audit(command, &config)?,
        }

        Ok(())
    }
}

fn scan_datasets(root: &Path, depth: Option<usize>, config: &Config) -> Result<Vec<DatasetFile>> {
    let mut scanner = Scanner::new(root).exclude_dirs(&config.exclude_dirs);
    if let Some(depth) = depth.or(config.default_depth) {
        scanner = scanner.max_depth(depth);
    }
    scanner.scan()
}

fn build_scrub_options(args: &ScrubArgs, config: &Config) -> ScrubOptions {
    ScrubOptions {
        dry_run: args.dry_run,
        verbose: args.verbose,
        atomic_write: config.atomic_write && !args.no_atomic,
        write_index: config.write_index || args.write_index,
        fail_fast: args.fail_fast,
        show_progress: !args.quiet && !args.json,
    }
}

fn run_scrub(args: ScrubArgs, config: &Config) -> Result<()> {
    let root = args.path.clone().unwrap_or_else(|| config.root_dir.clone());
    if !args.json {
        println!(
            "{}",
            format!("Scanning {} for datasets...", root.display()).cyan().bold()
        );
    }

    let datasets = scan_datasets(&root, args.depth, config)?;

    if datasets.is_empty() {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&ScrubResult::default())?);
        } else {
            println!("{}", "No .csv.zip datasets found.".yellow());
        }
        return Ok(());
    }

    if !args.json {
        println!(
            "{} datasets found",
            datasets.len().to_string().green().bold()
        );
    }

    let audit = AuditLogger::from_config(config);
    let run_id = audit.start_run("scrub", &root).ok();

    let scrubber = Scrubber::with_options(build_scrub_options(&args, config));
    let mut result = scrubber.scrub_multiple_with(&datasets, |outcome| {
        if let Some(run_id) = &run_id {
            let _ = audit.log_file(run_id, "scrub", outcome);
        }
    })?;

    if let Some(run_id) = &run_id {
        let _ = audit.finish_run(run_id, "scrub", &result);
    }
    result.run_id = run_id;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_scrub_summary(&result, args.dry_run, args.verbose);
    }

    if result.failed_count > 0 {
        bail!(
            "{} of {} datasets failed",
            result.failed_count,
            datasets.len()
        );
    }

    Ok(())
}

fn print_scrub_summary(result: &ScrubResult, dry_run: bool, verbose: bool) {
    println!();

    if dry_run && !verbose {
        for outcome in result
            .outcomes
            .iter()
            .filter(|o| o.status == FileStatus::DryRun)
        {
            println!("{}", describe_outcome(outcome, true));
        }
    }

    for error in &result.errors {
        eprintln!("{} {}", "✗".red(), error.red());
    }

    let verb = if dry_run { "would scrub" } else { "scrubbed" };
    println!(
        "{} {} {}, {} unchanged, {} failed, {} columns removed",
        "Completed:".bold(),
        result.scrubbed_count.to_string().green().bold(),
        verb,
        result.unchanged_count.to_string().yellow(),
        result.failed_count.to_string().red(),
        result.columns_removed
    );

    if result.not_processed > 0 {
        println!(
            "{}",
            format!(
                "Stopped early: {} datasets not processed",
                result.not_processed
            )
            .yellow()
        );
    }

    if let Some(run_id) = &result.run_id {
        println!("  Audit run: {}", run_id.bright_black());
    }
}

fn run_scan(path: Option<PathBuf>, depth: Option<usize>, json: bool, config: &Config) -> Result<()> {
    let root = path.unwrap_or_else(|| config.root_dir.clone());
    let datasets = scan_datasets(&root, depth, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&datasets)?);
        return Ok(());
    }

    if datasets.is_empty() {
        println!("{}", "No .csv.zip datasets found.".yellow());
        return Ok(());
    }

    println!(
        "\n{} datasets found under {}:\n",
        datasets.len().to_string().green().bold(),
        root.display()
    );
    display_datasets(&datasets);

    let total_size: u64 = datasets.iter().map(|d| d.size).sum();
    println!(
        "\n{} {}",
        "Total size:".bold(),
        format_size(total_size).green().bold()
    );

    Ok(())
}

fn display_datasets(datasets: &[DatasetFile]) {
    let mut table = PrettyTable::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(Row::new(vec![
        Cell::new("#"),
        Cell::new("Path"),
        Cell::new("Size"),
    ]));

    for (i, dataset) in datasets.iter().enumerate() {
        table.add_row(Row::new(vec![
            Cell::new(&(i + 1).to_string()),
            Cell::new(&dataset.path.display().to_string()),
            Cell::new(&dataset.size_human()),
        ]));
    }

    table.printstd();
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| {
        Config::ensure_config_dir().unwrap_or_else(|_| PathBuf::from("config.toml"))
    });

    let config = Config::default();
    config.save(&config_path)?;

    println!(
        "{} {}",
        "Config file created:".green().bold(),
        config_path.display()
    );

    Ok(())
}

fn run_audit(command: AuditCommands, config: &Config) -> Result<()> {
    let logger = AuditLogger::from_config(config);
    match command {
        AuditCommands::List { top, json } => {
            let runs = logger.list_runs()?;
            let shown = runs.into_iter().take(top).collect::<Vec<_>>();
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }
            if shown.is_empty() {
                println!("{}", "No audit runs found.".yellow());
                println!("  Log path: {}", logger.path().display());
                return Ok(());
            }
            println!("{}", "Audit runs:".cyan().bold());
            println!("  Log path: {}", logger.path().display());
            for run in shown {
                println!(
                    "  {}  {}  {}  scrubbed={} unchanged={} failed={} columns={}",
                    run.run_id.cyan().bold(),
                    run.command.bright_black(),
                    run.root.as_deref().unwrap_or("?"),
                    run.scrubbed.to_string().green(),
                    run.unchanged.to_string().yellow(),
                    run.failed.to_string().red(),
                    run.columns_removed
                );
            }
        }
        AuditCommands::Show { run, json } => {
            let records = logger.records_for_run(&run)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("{}", "No records found for this run.".yellow());
                return Ok(());
            }
            println!("{}", format!("Audit run {}", run).cyan().bold());
            for record in records {
                match record {
                    crate::audit::AuditRecord::FileAction {
                        path,
                        result,
                        removed_columns,
                        reason,
                        ..
                    } => {
                        println!(
                            "  {:<9} {}  removed: {}{}",
                            result,
                            path,
                            format_columns(&removed_columns),
                            reason.map(|r| format!("  ({})", r)).unwrap_or_default()
                        );
                    }
                    other => println!("{}", serde_json::to_string(&other)?),
                }
            }
        }
    }
    Ok(())
}
