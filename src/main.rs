use polars::prelude::DataFrame;
use std::{env, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reducible_bkg::analysis::Analyzer;
use reducible_bkg::config::AnalysisConfig;
use reducible_bkg::fakerate::FakeRateTable;
use reducible_bkg::generate::{generate, GeneratorConfig};
use reducible_bkg::io;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true, value_name = "LEVEL", default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Select quartets and compute reducible-background weights
    Run {
        input: PathBuf,
        #[arg(short, long, value_name = "JSON")]
        fake_rates: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        config: Option<PathBuf>,
        #[arg(long, value_name = "SUMMARY")]
        summary: Option<PathBuf>,
        #[arg(short = 'n', long, value_name = "N")]
        max_events: Option<usize>,
        #[arg(short = 'j', long, value_name = "THREADS", default_value_t = 0)]
        threads: usize,
        /// Keep 2P2F quartets of events that also have a 3P1F quartet
        #[arg(long)]
        keep_2p2f: bool,
        #[arg(long)]
        no_progress: bool,
    },
    /// Write toy events in the input format of `run`
    Generate {
        output: PathBuf,
        #[arg(short = 'n', long, value_name = "EVENTS", default_value_t = 10000)]
        events: usize,
        #[arg(short, long, value_name = "SEED", default_value_t = 0)]
        seed: u64,
        #[arg(long, value_name = "P", default_value_t = 0.8)]
        tight_probability: f64,
        #[arg(long, value_name = "P", default_value_t = 0.2)]
        extra_lepton_probability: f64,
        #[arg(short, long, value_name = "WEIGHT", default_value_t = 1.0)]
        weight: f64,
    },
    /// Sum the weights of a `run` output per region and flavor composition
    Summarize {
        input: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
}

fn print_table(df: &DataFrame) {
    env::set_var("POLARS_FMT_TABLE_ROUNDED_CORNERS", "1");
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    env::set_var("POLARS_FMT_MAX_ROWS", "-1");
    env::set_var("POLARS_FMT_STR_LEN", "50");
    println!("{}", df);
}

/// `RUST_LOG` directives take precedence over `--log-level`.
fn log_filter(level: tracing::Level, directives: Option<&str>) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    Ok(match directives {
        Some(d) => EnvFilter::try_new(d)?,
        None => EnvFilter::new(level.to_string()),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let directives = env::var("RUST_LOG").ok().filter(|d| !d.is_empty());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.log_level, directives.as_deref())?)
        .with_target(false)
        .init();
    match cli.command {
        Some(Commands::Run {
            input,
            fake_rates,
            output,
            config,
            summary,
            max_events,
            threads,
            keep_2p2f,
            no_progress,
        }) => {
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()?;
            }
            let mut config = match config {
                Some(path) => AnalysisConfig::from_json_file(path)?,
                None => AnalysisConfig::default(),
            };
            if max_events.is_some() {
                config.max_events = max_events;
            }
            if keep_2p2f {
                config.prefer_3p1f = false;
            }
            let table = FakeRateTable::from_json_file(&fake_rates)?;
            let analyzer = Analyzer::new(config, &table)?;
            let events = io::read_events(&input)?;
            info!(events = events.len(), input = ?input, "read events");

            let n = analyzer
                .config()
                .max_events
                .map_or(events.len(), |m| m.min(events.len()));
            let bar = (!no_progress).then(|| {
                ProgressBar::new(n as u64).with_style(
                    ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                )
            });
            let result = analyzer.run(&events, bar.as_ref())?;
            if let Some(bar) = &bar {
                bar.finish_and_clear();
            }
            result.diagnostics.log_summary();

            if let Some(out_path) = output {
                println!("Writing result to {:?}", out_path);
                io::write_rows(&out_path, &result.rows)?;
            }
            let mut res = io::summarize(&result.rows)?;
            print_table(&res);
            if let Some(out_path) = summary {
                println!("Writing summary to {:?}", out_path);
                io::write_tsv(&out_path, &mut res)?;
            }
        }
        Some(Commands::Generate {
            output,
            events,
            seed,
            tight_probability,
            extra_lepton_probability,
            weight,
        }) => {
            let config = GeneratorConfig {
                events,
                seed,
                tight_probability,
                extra_lepton_probability,
                base_weight: weight,
            };
            let records = generate(&config)?;
            println!("Writing {} events to {:?}", records.len(), output);
            io::write_events(&output, &records)?;
        }
        Some(Commands::Summarize { input, output }) => {
            let mut res = io::summarize_frame(io::read_tsv(&input)?)?;
            print_table(&res);
            if let Some(out_path) = output {
                println!("Writing result to {:?}", out_path);
                io::write_tsv(&out_path, &mut res)?;
            }
        }
        None => Cli::command().print_help()?,
    }
    Ok(())
}
