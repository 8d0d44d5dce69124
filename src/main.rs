//! Lazarus CLI
//!
//! Runs a directory of modules headlessly under the reload supervisor, or
//! checks that a single module loads.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lazarus::{EntryPoint, Interpreter, Supervisor, SupervisorConfig, SupervisorState, Value, VERSION};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "lazarus")]
#[command(author, version, about = "Live module reloading and crash recovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a module directory in a headless frame loop
    Run(RunArgs),

    /// Load one module file and print its value graph
    Check {
        /// The module file to load
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directory to watch (overrides the config file)
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,

    /// JSON supervisor configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds between scans
    #[arg(long, value_name = "S")]
    interval: Option<f64>,

    /// Frames per second
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Log failed reloads instead of entering the error state
    #[arg(long)]
    quiet: bool,

    /// Let failures propagate and stop the loop
    #[arg(long)]
    unprotected: bool,

    /// Module whose functions are bound to the entry points
    #[arg(long, value_name = "MODULE")]
    entry: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Check { file } => check(&file),
    }
}

fn setup_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn,lazarus::script=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &RunArgs) -> anyhow::Result<SupervisorConfig> {
    let mut config = match &args.config {
        Some(path) => SupervisorConfig::load(path)
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => SupervisorConfig::default(),
    };
    if let Some(dir) = &args.dir {
        config.watch_path = dir.clone();
    }
    if let Some(interval) = args.interval {
        config.scan_interval_seconds = interval;
    }
    if args.quiet {
        config.quiet_mode = true;
    }
    if args.unprotected {
        config.protected_mode = false;
    }
    if let Some(entry) = &args.entry {
        config.entry_module = Some(entry.clone());
    }
    config.validate()?;
    Ok(config)
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    if !args.fps.is_finite() || args.fps <= 0.0 {
        bail!("--fps must be a positive number, got {}", args.fps);
    }
    let config = load_config(&args)?;
    let watch_path = config.watch_path.clone();
    let mut supervisor = Supervisor::new(config)
        .with_context(|| format!("starting supervisor in '{}'", watch_path.display()))?;

    println!("lazarus {} watching {}", VERSION, watch_path.display());

    let frame = Duration::from_secs_f64(1.0 / args.fps);
    let mut last = Instant::now();
    let mut frames = 0u64;
    let mut was_error = false;

    while args.frames.map_or(true, |limit| frames < limit) {
        let start = Instant::now();
        let dt = start.duration_since(last).as_secs_f64();
        last = start;

        for report in supervisor.tick() {
            println!("{}", report);
        }
        supervisor.dispatch(EntryPoint::Update, &[Value::Number(dt)])?;
        supervisor.dispatch(EntryPoint::Draw, &[])?;

        let in_error = supervisor.state() == SupervisorState::Error;
        if in_error && !was_error {
            eprintln!("{}", supervisor.overlay().render_text());
        } else if !in_error && was_error {
            println!("recovered, resuming");
        }
        was_error = in_error;

        if supervisor.quit_requested() {
            break;
        }

        frames += 1;
        std::thread::sleep(frame.saturating_sub(start.elapsed()));
    }

    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("reading '{}'", path.display()))?;

    let interpreter = Interpreter::new();
    match interpreter.load_module(&source, &path.display().to_string()) {
        Ok(module) => {
            println!("{}", module);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            if let Some(trace) = e.stack_trace() {
                eprint!("{}", trace);
            }
            bail!("'{}' failed to load", path.display())
        }
    }
}
