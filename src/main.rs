//! Vessel Financial Model
//!
//! Command-line front end: keeps analyses in a local SQLite store, takes
//! extractor replies or chat messages, runs the cash-flow engine and passes
//! questions about stored results to an analyst.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use vessel_model::ModelError;
use vessel_model::calculator::{self, REQUIRED_INPUTS};
use vessel_model::config::{self, Config};
use vessel_model::db;
use vessel_model::extraction::{self, Analyst, Extractor};
use vessel_model::models::{CalculationResult, ParameterSet, RawParameter};
use vessel_model::normalizer::normalize_with;
use vessel_model::sensitivity;

#[derive(Parser)]
#[command(name = "vessel-model")]
#[command(about = "Financial model for vessel purchases")]
struct Cli {
    /// Path to the SQLite analysis store
    #[arg(short, long, default_value = "vessel_model.db")]
    database: PathBuf,

    /// Path to the TOML configuration
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store and write a default config if none exists
    Init,

    /// Create a new analysis
    New {
        /// Analysis name
        name: String,
    },

    /// List analyses
    List,

    /// Delete an analysis with its parameters and result
    Delete { id: i64 },

    /// Add parameters from a saved extractor reply ("-" reads stdin)
    Add { id: i64, reply: PathBuf },

    /// Send a chat message through the configured extractor
    Chat { id: i64, message: String },

    /// Show the current parameter set
    Params { id: i64 },

    /// Run the calculation and store the result
    Calc {
        id: i64,

        /// Show the year-by-year breakdown
        #[arg(short, long)]
        verbose: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the stored result
    Show {
        id: i64,

        #[arg(long)]
        json: bool,
    },

    /// Ask the configured analyst a question about the stored result
    Ask { id: i64, question: String },

    /// NPV/IRR under relative shocks to the main drivers
    Sensitivity {
        id: i64,

        /// Relative shift, e.g. -0.1 (repeatable; defaults from config)
        #[arg(long = "shift", allow_hyphen_values = true)]
        shifts: Vec<f64>,
    },

    /// Calculate every scenario file (*.json) under a directory
    Batch { dir: PathBuf },

    /// Create an analysis preloaded with a round-number scenario
    Sample {
        #[arg(default_value = "Sample vessel")]
        name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            if !cli.config.exists() {
                Config::default().save(&cli.config)?;
                println!("Wrote default config to {}", cli.config.display());
            }
            println!("Store initialized at: {}", cli.database.display());
        }

        Commands::New { name } => {
            let id = db::create_analysis(&conn, &name)?;
            println!("Created analysis {} ({})", id, name);
        }

        Commands::List => {
            let analyses = db::list_analyses(&conn)?;
            if analyses.is_empty() {
                println!("No analyses yet. Run 'new' or 'sample' first.");
            } else {
                println!("{:>5}  {:<30} {:>6} {:>7}  {}", "ID", "Name", "Turns", "Result", "Created");
                println!("{}", "-".repeat(72));
                for a in analyses {
                    println!(
                        "{:>5}  {:<30} {:>6} {:>7}  {}",
                        a.id,
                        a.name,
                        a.turns,
                        if a.has_result { "yes" } else { "no" },
                        a.created_at
                    );
                }
            }
        }

        Commands::Delete { id } => {
            if db::delete_analysis(&conn, id)? {
                println!("Deleted analysis {}", id);
            } else {
                println!("Analysis {} not found", id);
            }
        }

        Commands::Add { id, reply } => {
            let text = read_reply(&reply)?;
            let raw = extraction::parse_reply(&text)?;
            let set = add_turn(&conn, &cfg, id, &raw)?;
            print_parameters(&set);
        }

        Commands::Chat { id, message } => {
            let extractor = cfg
                .extractor
                .clone()
                .context("No [extractor] section in config; use 'add' with a saved reply instead")?;
            let set = chat(&conn, &cfg, id, &extractor, &message)?;
            print_parameters(&set);
        }

        Commands::Params { id } => {
            let set = db::parameter_set(&conn, id, &cfg.normalize)?;
            print_parameters(&set);
        }

        Commands::Calc { id, verbose, json } => {
            let set = db::parameter_set(&conn, id, &cfg.normalize)?;
            let result = run_calculation(&set, &cfg)?;
            db::upsert_result(&conn, id, &result)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                if verbose {
                    let projection = calculator::project(&set)?;
                    println!("{}", calculator::format_projection(&projection));
                }
                println!("{}", result);
            }
        }

        Commands::Show { id, json } => match db::get_result(&conn, id)? {
            Some((result, calculated_at)) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!("Calculated at {}\n", calculated_at);
                    println!("{}", result);
                }
            }
            None => println!("No result for analysis {}. Run 'calc' first.", id),
        },

        Commands::Ask { id, question } => {
            let analyst = cfg
                .analyst
                .clone()
                .context("No [analyst] section in config")?;
            println!("{}", ask(&conn, id, &analyst, &question)?);
        }

        Commands::Sensitivity { id, shifts } => {
            let set = db::parameter_set(&conn, id, &cfg.normalize)?;
            let shifts = if shifts.is_empty() {
                cfg.sensitivity.shifts.clone()
            } else {
                shifts
            };
            let base = run_calculation(&set, &cfg)?;
            let cases = sensitivity::sensitivity(&set, &shifts, &cfg.solver)?;
            println!(
                "{}",
                sensitivity::format_cases(base.profitability_metrics.npv, &cases)
            );
        }

        Commands::Batch { dir } => {
            let files = extraction::find_scenario_files(&dir)?;
            println!("Found {} scenario files in {}", files.len(), dir.display());
            let mut failures = 0;
            for path in &files {
                match run_scenario(path, &cfg) {
                    Ok(result) => {
                        let m = result.profitability_metrics;
                        println!(
                            "  {}: NPV {:.0}, IRR {}, payback {}",
                            path.display(),
                            m.npv,
                            m.irr
                                .map(|r| format!("{:.2}%", r * 100.0))
                                .unwrap_or_else(|| "undefined".to_string()),
                            m.payback_period
                                .map(|p| format!("{:.2}y", p))
                                .unwrap_or_else(|| "not reached".to_string()),
                        );
                    }
                    Err(e) => {
                        eprintln!("  {}: {:#}", path.display(), e);
                        failures += 1;
                    }
                }
            }
            println!("{} calculated, {} failed", files.len() - failures, failures);
        }

        Commands::Sample { name } => {
            let id = db::create_analysis(&conn, &name)?;
            add_turn(&conn, &cfg, id, &sample_parameters())?;
            println!("Created analysis {} ({}) with sample parameters", id, name);
        }
    }

    Ok(())
}

fn read_reply(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read reply from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Normalize a turn against the stored set and store it only if it is clean
fn add_turn(conn: &Connection, cfg: &Config, id: i64, raw: &[RawParameter]) -> Result<ParameterSet> {
    let existing = db::parameter_set(conn, id, &cfg.normalize)?;
    let set = normalize_with(raw, &existing, &cfg.normalize)?;
    db::append_turn(conn, id, raw)?;
    Ok(set)
}

fn chat(conn: &Connection, cfg: &Config, id: i64, extractor: &dyn Extractor, message: &str) -> Result<ParameterSet> {
    let raw = extractor.extract(message)?;
    if raw.is_empty() {
        bail!("The extractor found no parameters in that message");
    }
    add_turn(conn, cfg, id, &raw)
}

fn ask(conn: &Connection, id: i64, analyst: &dyn Analyst, question: &str) -> Result<String> {
    let Some((result, _)) = db::get_result(conn, id)? else {
        bail!("No result for analysis {}. Run 'calc' first.", id);
    };
    analyst.answer(question, &result)
}

fn run_calculation(set: &ParameterSet, cfg: &Config) -> Result<CalculationResult> {
    match calculator::calculate_with(set, &cfg.solver) {
        Ok(result) => Ok(result),
        Err(ModelError::MissingParameter { key }) => {
            bail!("Missing parameter '{}'. Add it in chat, then calculate again.", key)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_scenario(path: &Path, cfg: &Config) -> Result<CalculationResult> {
    let raw = extraction::load_scenario(path)?;
    let set = normalize_with(&raw, &ParameterSet::new(), &cfg.normalize)?;
    run_calculation(&set, cfg)
}

fn print_parameters(set: &ParameterSet) {
    if set.is_empty() {
        println!("No parameters yet.");
    } else {
        println!("{:<28} {:>20} {:<10}", "Parameter", "Value", "Type");
        println!("{}", "-".repeat(60));
        for p in set.iter() {
            println!("{:<28} {:>20} {:<10}", p.key, p.value.to_string(), p.unit);
        }
    }

    let missing: Vec<&str> = REQUIRED_INPUTS
        .iter()
        .filter(|input| {
            !std::iter::once(input.canonical)
                .chain(input.aliases.iter().copied())
                .any(|key| set.contains_key(key))
        })
        .map(|input| input.canonical)
        .collect();
    if !missing.is_empty() {
        println!("\nStill needed before calculating: {}", missing.join(", "));
    }
}

/// Round-number scenario: 100M vessel, five years, 20M net a year
fn sample_parameters() -> Vec<RawParameter> {
    vec![
        RawParameter::new("vesselName", "Sample Bulker", "text"),
        RawParameter::new("purchasePrice", "100,000,000", "currency"),
        RawParameter::new("term", "5", "years"),
        RawParameter::new("discountRate", "0.1", "percentage"),
        RawParameter::new("annualRevenue", "30,000,000", "currency"),
        RawParameter::new("annualOperatingCost", "10,000,000", "currency"),
        RawParameter::new("deadweightTonnage", "82000", "tonnage"),
    ]
}
