use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rtriage_eval::{HostState, MemoryIssueSink, RunContext, ScenarioRunner};
use rtriage_rules::{parse_rules_directory, parse_rules_file, RuleCollection};
use rtriage_search::{seek_file_since, ConstraintConfig, SearchConstraint};

#[derive(Parser)]
#[command(name = "rtriage")]
#[command(about = "Validate diagnostic rule files and run them against captured host data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse all rule files in a file or directory and report results
    Validate {
        /// Path to a rule YAML file or a directory of rule files
        path: PathBuf,

        /// Show details for each error (not just summary)
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run scenarios against a captured data root and print raised issues
    Run {
        /// Path to a rule YAML file or a directory of rule files
        #[arg(short, long)]
        rules: PathBuf,

        /// Root directory holding the captured host filesystem
        #[arg(short, long)]
        data_root: PathBuf,

        /// YAML file describing host state (packages, services, boot time)
        #[arg(long)]
        host_state: Option<PathBuf>,

        /// Widen the search window to cover rotated logs
        #[arg(long)]
        all_logs: bool,

        /// Explicit search window override, in hours
        #[arg(long)]
        since_hours: Option<f64>,

        /// Reference time for search windows, `YYYY-mm-dd HH:MM:SS`
        /// (defaults to the current time; set it when analyzing old captures)
        #[arg(long)]
        now: Option<String>,

        /// Output format for raised issues
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Seek a log file to the first line at or after a cutoff and print
    /// everything from there
    Seek {
        /// Path to the log file
        file: PathBuf,

        /// Cutoff timestamp, `YYYY-mm-dd HH:MM:SS`
        since: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { path, verbose } => cmd_validate(path, verbose),
        Commands::Run {
            rules,
            data_root,
            host_state,
            all_logs,
            since_hours,
            now,
            format,
        } => cmd_run(rules, data_root, host_state, all_logs, since_hours, now, format),
        Commands::Seek { file, since } => cmd_seek(file, since),
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_validate(path: PathBuf, verbose: bool) {
    let collection = load_rules(&path);
    let scenarios = collection.scenarios.len();
    let checks: usize = collection.scenarios.iter().map(|s| s.checks.len()).sum();
    let conclusions: usize = collection
        .scenarios
        .iter()
        .map(|s| s.conclusions.len())
        .sum();
    let errors = collection.errors.len();

    println!("Parsed {scenarios} scenarios from {}", path.display());
    println!("  Checks:       {checks}");
    println!("  Conclusions:  {conclusions}");
    println!("  Parse errors: {errors}");

    if verbose && !collection.errors.is_empty() {
        println!("\nErrors:");
        for err in &collection.errors {
            println!("  - {err}");
        }
    }

    if errors > 0 {
        process::exit(1);
    }
}

fn cmd_run(
    rules_path: PathBuf,
    data_root: PathBuf,
    host_state: Option<PathBuf>,
    all_logs: bool,
    since_hours: Option<f64>,
    now_override: Option<String>,
    format: OutputFormat,
) {
    let collection = load_rules(&rules_path);
    let host = match host_state {
        Some(path) => load_host_state(&path),
        None => HostState::default(),
    };

    let now = match now_override {
        Some(s) => match NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
            Ok(ts) => ts,
            Err(e) => {
                eprintln!("Invalid reference time '{s}': {e}");
                process::exit(1);
            }
        },
        None => Utc::now().naive_utc(),
    };
    let config = ConstraintConfig {
        hours: since_hours,
        all_logs,
        ..Default::default()
    };
    let constraint = Arc::new(SearchConstraint::new(now, &config));
    let ctx = RunContext::new(data_root, now, host).with_constraint(constraint);

    let mut sink = MemoryIssueSink::new();
    let report = match ScenarioRunner::new(&ctx).run(&collection, &mut sink) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error running scenarios: {e}");
            process::exit(1);
        }
    };

    let issues = sink.into_issues();
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&issues).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(&issues).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(out) => println!("{out}"),
        Err(e) => {
            eprintln!("Serialization error: {e}");
            process::exit(1);
        }
    }

    eprintln!(
        "Evaluated {} scenarios, {} issues raised, {} failed.",
        report.scenarios_evaluated,
        report.issues_raised,
        report.failed_scenarios.len()
    );
    if !report.failed_scenarios.is_empty() {
        process::exit(1);
    }
}

fn cmd_seek(file: PathBuf, since: String) {
    use std::io::{BufRead, BufReader, Seek, SeekFrom};

    let cutoff = match NaiveDateTime::parse_from_str(&since, "%Y-%m-%d %H:%M:%S") {
        Ok(ts) => ts,
        Err(e) => {
            eprintln!("Invalid cutoff '{since}': {e}");
            process::exit(1);
        }
    };

    let offset = match seek_file_since(&file, cutoff) {
        Ok(offset) => offset,
        Err(e) => {
            eprintln!("Error seeking {}: {e}", file.display());
            process::exit(1);
        }
    };
    eprintln!("Seeked {} to byte offset {offset}.", file.display());

    let mut reader = match std::fs::File::open(&file).map(BufReader::new) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error opening {}: {e}", file.display());
            process::exit(1);
        }
    };
    if let Err(e) = reader.seek(SeekFrom::Start(offset)) {
        eprintln!("Error seeking {}: {e}", file.display());
        process::exit(1);
    }
    for line in reader.lines() {
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("Error reading {}: {e}", file.display());
                process::exit(1);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_rules(path: &Path) -> RuleCollection {
    let collection = if path.is_dir() {
        match parse_rules_directory(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading rules from {}: {e}", path.display());
                process::exit(1);
            }
        }
    } else {
        match parse_rules_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading rules {}: {e}", path.display());
                process::exit(1);
            }
        }
    };

    if !collection.errors.is_empty() {
        eprintln!(
            "Warning: {} parse errors while loading rules",
            collection.errors.len()
        );
    }
    collection
}

fn load_host_state(path: &Path) -> HostState {
    let yaml = match std::fs::read_to_string(path) {
        Ok(y) => y,
        Err(e) => {
            eprintln!("Error reading host state {}: {e}", path.display());
            process::exit(1);
        }
    };
    match HostState::from_yaml(&yaml) {
        Ok(host) => host,
        Err(e) => {
            eprintln!("Error parsing host state {}: {e}", path.display());
            process::exit(1);
        }
    }
}
