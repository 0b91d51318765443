//! dtpfix CLI
//!
//! Commands:
//! - `fix`: select nodes, apply fixes, journal every mutation
//! - `revert`: undo a session file or a whole log directory
//! - `rules`: list the fix catalogue

mod config;
mod dtp_client;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dtpfix_core::{NodeType, OntologyLevel, Target};
use dtpfix_engine::{Engine, FixContext, Mode, RevertReport, RunReport};
use dtpfix_rules::{catalogue, known_fix_ids, Ontology, ALL_FIXES};

use config::{DtpConfig, DEFAULT_CONFIG_FILE};
use dtp_client::DtpClient;

#[derive(Parser)]
#[command(name = "dtpfix")]
#[command(author, version, about = "Fix and revert malformed nodes in a DTP knowledge graph")]
struct Cli {
    /// Config file (JSON). Optional unless given explicitly.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print the report as JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply fixes to the selected nodes
    Fix(FixArgs),
    /// Undo the mutations recorded in a session file or log directory
    Revert(RevertArgs),
    /// List the available fixes
    Rules {
        /// Only this ontology (b2t, dtc)
        #[arg(long, short = 'o')]
        ontology: Option<Ontology>,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// DTP API endpoint (overrides the config and DTP_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Directory for session logs (overrides the config)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Args)]
struct FixArgs {
    /// Ontology the graph follows (b2t, dtc)
    #[arg(long, short = 'o', default_value = "b2t")]
    ontology: Ontology,

    /// Ontology level: element, task, activity or all
    #[arg(long, short = 't', default_value = "all")]
    target_level: Target<OntologyLevel>,

    /// Node provenance: asbuilt, asdesigned or all
    #[arg(long, short = 'n', default_value = "all")]
    node_type: Target<NodeType>,

    /// Fix id, fix group or `all` (see `dtpfix rules`)
    #[arg(long, short = 'f', default_value = ALL_FIXES)]
    fix: String,

    /// Journal the mutations without modifying the store
    #[arg(long, short = 's')]
    simulation: bool,

    /// Nodes per query page (overrides the config)
    #[arg(long)]
    page_size: Option<usize>,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct RevertArgs {
    /// Session file, or a log directory to revert every session in it
    path: PathBuf,

    #[command(flatten)]
    store: StoreArgs,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// SIGINT/SIGTERM set the flag; the engine stops before the next node so the
/// journal never ends mid-node.
fn stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .map_err(|e| anyhow!("failed to register signal handler: {e}"))?;
    }
    Ok(stop)
}

fn load_config(cli_config: Option<&Path>, store: &StoreArgs) -> Result<DtpConfig> {
    let mut config = match cli_config {
        Some(path) => DtpConfig::load(path, true)?,
        None => DtpConfig::load(Path::new(DEFAULT_CONFIG_FILE), false)?,
    };
    if let Some(log_dir) = &store.log_dir {
        config.log_dir = log_dir.clone();
    }
    Ok(config)
}

fn connect(config: &DtpConfig, store: &StoreArgs) -> Result<DtpClient> {
    let endpoint = config.endpoint_url(store.endpoint.as_deref())?;
    let client = DtpClient::new(endpoint, config.token()?, config.timeout())?;
    tracing::debug!(endpoint = %client.base(), "connected");
    Ok(client)
}

fn cmd_fix(cli_config: Option<&Path>, args: FixArgs, json: bool) -> Result<ExitCode> {
    let mut config = load_config(cli_config, &args.store)?;
    if let Some(page_size) = args.page_size {
        if page_size == 0 {
            return Err(anyhow!("--page-size must be at least 1"));
        }
        config.page_size = page_size;
    }
    let ctx = config.fix_context(args.ontology)?;
    let client = connect(&config, &args.store)?;

    if args.simulation {
        println!("{}", "Running in simulation mode: the store will not be modified.".yellow());
    }
    let engine = Engine::new(&ctx, &client).with_stop_flag(stop_flag()?);
    let report = engine.run_fixes(args.target_level, args.node_type, &args.fix, args.simulation)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }
    Ok(if report.has_failures() || report.stopped_early {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn cmd_revert(cli_config: Option<&Path>, args: RevertArgs, json: bool) -> Result<ExitCode> {
    let config = load_config(cli_config, &args.store)?;
    let client = connect(&config, &args.store)?;
    // Reverts replay the journal as written; the ontology is not consulted.
    let ctx = FixContext::new(Ontology::B2t, &config.log_dir);
    let report = Engine::new(&ctx, &client).run_revert(&args.path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_revert_report(&report);
    }
    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn cmd_rules(ontology: Option<Ontology>) {
    for onto in [Ontology::B2t, Ontology::Dtc] {
        if ontology.is_some_and(|o| o != onto) {
            continue;
        }
        println!("{} {}", "Ontology".green().bold(), onto);
        for rule in catalogue().iter().filter(|r| r.ontology == onto) {
            let levels: Vec<&str> = rule.levels.iter().map(|l| l.as_str()).collect();
            let types: Vec<&str> = rule.node_types.iter().map(|t| t.as_str()).collect();
            println!(
                "  {:<24} {:<10} [{}] [{}]",
                rule.id.cyan(),
                rule.group,
                levels.join(","),
                types.join(",")
            );
            println!("      {}", rule.description.dimmed());
        }
        println!("  accepted: {}", known_fix_ids(onto).join(", "));
    }
}

fn print_run_report(report: &RunReport) {
    let mode = match report.mode {
        Mode::Simulated => report.mode.as_str().yellow().bold(),
        Mode::Real => report.mode.as_str().green().bold(),
    };
    println!("{} {} ({mode})", "Fix run".green().bold(), report.ontology);
    println!("  session: {}", report.session_file.display());
    for (fix, counts) in &report.fixes {
        println!(
            "  {:<24} applied {:>5}  skipped {:>5}  failed {:>5}",
            fix, counts.applied, counts.skipped, counts.failed
        );
    }
    println!(
        "  nodes visited {}, changed {}",
        report.nodes_visited, report.nodes_changed
    );
    for failure in report.rule_errors.iter().chain(&report.execution_errors) {
        println!(
            "  {} {} [{}]: {}",
            "failed".red(),
            failure.node,
            failure.fix,
            failure.error
        );
    }
    if report.stopped_early {
        println!("  {}", "stopped before all nodes were visited".yellow());
    }
}

fn print_revert_report(report: &RevertReport) {
    println!(
        "{} {} session file(s)",
        "Revert".green().bold(),
        report.files.len()
    );
    for file in &report.files {
        println!("  {}", file.display());
    }
    println!(
        "  reverted {}, skipped {}, failed {}",
        report.applied.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for skipped in report.conflicts() {
        println!(
            "  {} {} #{} {}: {}",
            "conflict".yellow(),
            skipped.entry.node,
            skipped.entry.seq,
            skipped.entry.fix,
            skipped.reason
        );
    }
    for failed in &report.failed {
        println!(
            "  {} {} #{} {}: {}",
            "failed".red(),
            failed.entry.node,
            failed.entry.seq,
            failed.entry.fix,
            failed.error
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Fix(args) => cmd_fix(config, args, cli.json),
        Commands::Revert(args) => cmd_revert(config, args, cli.json),
        Commands::Rules { ontology } => {
            cmd_rules(ontology);
            Ok(ExitCode::SUCCESS)
        }
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
