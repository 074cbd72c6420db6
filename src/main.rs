//! Command-line interface for driftscan
//!
//! Thin glue over the library: scan a workspace, watch it, run quality
//! gates, query the manifest, and inspect the catalog. All analysis
//! logic lives in the library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use console::style;
use driftscan::gates::GateRequest;
use driftscan::model::PatternStatus;
use driftscan::store::PatternQuery;
use driftscan::{Config, PatternCategory, WatchConfig, Workspace};
use env_logger::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Instant;

/// An architectural-drift analyzer
#[derive(Parser, Debug)]
#[command(
    name = "driftscan",
    version,
    author,
    about = "Learns the recurring patterns of a source tree and reports where code deviates from them",
    long_about = None
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "driftscan.toml")]
    config: PathBuf,

    /// Set verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the workspace and update the pattern catalog
    Scan {
        /// Workspace root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,

        /// Re-scan only files whose content hash changed
        #[arg(short, long)]
        incremental: bool,

        /// Restrict the scan to these files
        #[arg(long, value_name = "FILE")]
        file: Vec<PathBuf>,

        /// Restrict to these categories (repeatable)
        #[arg(long, value_name = "CATEGORY")]
        category: Vec<String>,
    },

    /// Watch the workspace and merge changes online
    Watch {
        /// Workspace root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,

        /// Debounce delay in milliseconds
        #[arg(long, default_value = "300")]
        debounce: u64,

        /// Do not persist merged state
        #[arg(long)]
        no_persist: bool,
    },

    /// Run the quality gates over a change set
    Gate {
        /// Workspace root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,

        /// Branch under evaluation
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Commit under evaluation
        #[arg(long)]
        commit: Option<String>,

        /// Files in the change set
        #[arg(long, value_name = "FILE")]
        file: Vec<PathBuf>,

        /// Mark this as a CI run
        #[arg(long)]
        ci: bool,
    },

    /// Query the manifest by pattern or file
    Query {
        /// Workspace root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,

        /// Substring matched against pattern ids and names
        #[arg(short, long)]
        pattern: Option<String>,

        /// File path or glob
        #[arg(short, long)]
        file: Option<String>,

        /// Restrict to one category
        #[arg(long)]
        category: Option<String>,

        /// Restrict to one status (discovered, approved, ignored)
        #[arg(long)]
        status: Option<String>,

        /// Cap on locations returned per pattern
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Summarize the pattern catalog and recent gate runs
    Status {
        /// Workspace root
        #[arg(value_name = "PATH", default_value = ".")]
        root: PathBuf,
    },

    /// Write a default driftscan.toml
    Init {
        /// Force overwrite if the file already exists
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Scan {
            root,
            incremental,
            file,
            category,
        } => cmd_scan(root, config, incremental, file, category, cli.quiet),
        Commands::Watch {
            root,
            debounce,
            no_persist,
        } => cmd_watch(root, config, debounce, no_persist),
        Commands::Gate {
            root,
            branch,
            commit,
            file,
            ci,
        } => cmd_gate(root, config, branch, commit, file, ci),
        Commands::Query {
            root,
            pattern,
            file,
            category,
            status,
            limit,
        } => cmd_query(root, config, pattern, file, category, status, limit),
        Commands::Status { root } => cmd_status(root, config),
        Commands::Init { force } => cmd_init(cli.config, force),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    Builder::new().filter_level(level).init();
}

fn parse_categories(names: &[String]) -> Result<Option<Vec<PatternCategory>>> {
    if names.is_empty() {
        return Ok(None);
    }
    names
        .iter()
        .map(|n| {
            PatternCategory::parse(n).with_context(|| format!("unknown category '{n}'"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn cmd_scan(
    root: PathBuf,
    mut config: Config,
    incremental: bool,
    files: Vec<PathBuf>,
    categories: Vec<String>,
    quiet: bool,
) -> Result<()> {
    config.scan.categories = parse_categories(&categories)?;
    let workspace = Workspace::open(&root, config);

    let spinner = if quiet {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("scanning...");
        Some(bar)
    };

    let started = Instant::now();
    let explicit = if files.is_empty() { None } else { Some(files) };
    let summary = workspace.scan(incremental, explicit)?;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    println!(
        "{} {} files walked, {} scanned in {:.1}s",
        style("scan complete:").bold(),
        summary.files_walked,
        summary.files_scanned,
        started.elapsed().as_secs_f64()
    );
    println!(
        "  {} patterns, {} violations, {} errors",
        summary.patterns.to_string().green(),
        if summary.violations > 0 {
            summary.violations.to_string().yellow()
        } else {
            summary.violations.to_string().green()
        },
        if summary.errors > 0 {
            summary.errors.to_string().red()
        } else {
            summary.errors.to_string().green()
        },
    );
    for violation in summary.report.violations.iter().take(20) {
        println!(
            "  {} {}:{} {}",
            "drift".yellow(),
            violation.violation.location.file.display(),
            violation.violation.location.line,
            violation.violation.message
        );
    }
    Ok(())
}

fn cmd_watch(root: PathBuf, config: Config, debounce: u64, no_persist: bool) -> Result<()> {
    let workspace = Workspace::open(&root, config);
    let watch_config = WatchConfig {
        debounce_ms: debounce,
        persist: !no_persist,
        ..WatchConfig::default()
    };
    let mut engine = workspace.watch(watch_config)?;
    let stop = engine.stop_handle();
    ctrlc_handler(stop);
    println!("{} {}", style("watching").bold(), root.display());
    engine.run()?;
    Ok(())
}

// Minimal SIGINT hook without an extra dependency: the watch loop polls
// the flag between events.
fn ctrlc_handler(stop: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let _ = std::thread::Builder::new()
        .name("driftscan-signal".to_string())
        .spawn(move || {
            let mut buf = String::new();
            // Reaching EOF on stdin (Ctrl-D) or an input line "quit"
            // requests shutdown.
            loop {
                buf.clear();
                match std::io::stdin().read_line(&mut buf) {
                    Ok(0) => break,
                    Ok(_) if buf.trim() == "quit" => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        });
}

fn cmd_gate(
    root: PathBuf,
    config: Config,
    branch: String,
    commit: Option<String>,
    files: Vec<PathBuf>,
    ci: bool,
) -> Result<()> {
    let workspace = Workspace::open(&root, config);
    let report = workspace.run_gates(GateRequest {
        files,
        branch,
        base_branch: None,
        commit,
        ci,
        call_graph: None,
        boundaries: None,
        custom_rules: Vec::new(),
    })?;

    let verdict = if report.record.passed {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "{verdict} score {:.0} ({} violations)",
        report.record.score, report.record.violations
    );
    for outcome in &report.outcomes {
        println!(
            "  {:<24} {:>7} {:.0}  {}",
            outcome.gate.id(),
            format!("{:?}", outcome.status).to_lowercase(),
            outcome.score,
            outcome.summary
        );
        if let Some(error) = &outcome.error {
            println!("    {} {error}", "error:".red());
        }
    }
    std::process::exit(report.exit_code());
}

fn cmd_query(
    root: PathBuf,
    config: Config,
    pattern: Option<String>,
    file: Option<String>,
    category: Option<String>,
    status: Option<String>,
    limit: usize,
) -> Result<()> {
    let workspace = Workspace::open(&root, config);

    if let Some(file) = file {
        match workspace.query_file(&file)? {
            Some(hit) => {
                println!("{} (hash {})", style(&hit.file).bold(), hit.hash);
                for id in &hit.patterns {
                    println!("  {id}");
                }
            }
            None => println!("no file matches {file}"),
        }
        return Ok(());
    }

    let status = match status.as_deref() {
        None => None,
        Some("discovered") => Some(PatternStatus::Discovered),
        Some("approved") => Some(PatternStatus::Approved),
        Some("ignored") => Some(PatternStatus::Ignored),
        Some(other) => anyhow::bail!("unknown status '{other}'"),
    };
    let category = category
        .as_deref()
        .map(|c| PatternCategory::parse(c).with_context(|| format!("unknown category '{c}'")))
        .transpose()?;

    let hits = workspace.query_patterns(&PatternQuery {
        text: pattern,
        category,
        status,
        min_confidence: None,
        file_glob: None,
        limit: Some(limit),
    })?;
    if hits.is_empty() {
        println!("no patterns match");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{} {} [{}] ({} locations)",
            style(&hit.pattern_id).bold(),
            hit.pattern_name,
            hit.category,
            hit.total_count
        );
        for location in &hit.locations {
            println!(
                "    {}:{}-{} {} {}",
                location.file.display(),
                location.start_line,
                location.end_line,
                format!("{:?}", location.kind).to_lowercase(),
                location.name
            );
        }
    }
    Ok(())
}

fn cmd_status(root: PathBuf, config: Config) -> Result<()> {
    let workspace = Workspace::open(&root, config);
    let stats = workspace.stats()?;

    println!("{}", style("pattern catalog").bold());
    println!("  total:     {}", stats.total);
    println!("  locations: {}", stats.locations);
    println!("  outliers:  {}", stats.outliers);
    for (status, count) in &stats.by_status {
        println!("  {status}: {count}");
    }
    for (category, count) in &stats.by_category {
        println!("    {category}: {count}");
    }

    let runs = workspace.recent_runs(5);
    if !runs.is_empty() {
        println!("{}", style("recent gate runs").bold());
        for run in runs {
            println!(
                "  {} {} {} score {:.0}",
                run.id,
                run.branch,
                if run.passed {
                    "passed".green()
                } else {
                    "failed".red()
                },
                run.score
            );
        }
    }
    Ok(())
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default()
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
