use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use itertools::Itertools;
use mimalloc::MiMalloc;
use netdep_extract::{
    AnalyserConfig, BridgeLoader, DumpLoader, ProgramLoader, discover, read_env_file,
};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Infer the network dependencies between the services of a Go project.
///
/// Every immediate subdirectory of the service directory is analysed as one
/// service. The result is a JSON adjacency list mapping each service to the
/// peers it calls over HTTP or the message bus.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Module root of the Go project
    #[arg(short, long = "project-directory", default_value = "./")]
    project_directory: PathBuf,

    /// Directory whose subdirectories are the services to analyse
    #[arg(short, long = "service-directory", default_value = "./svc")]
    service_directory: PathBuf,

    /// File of `SERVICE.VAR=VALUE` lines used to resolve `os.Getenv`
    #[arg(short, long = "environment-variables")]
    environment_variables: Option<PathBuf>,

    /// Output file path (writes to stdout if not specified)
    #[arg(short, long = "output-filename")]
    output_filename: Option<PathBuf>,

    /// Command that dumps a service's SSA program as JSON
    ///
    /// Without it, each service directory must contain an `ssa.json` dump.
    #[arg(long, value_name = "CMD")]
    ssa_bridge: Option<PathBuf>,

    /// More output per occurrence; `-v` also logs unresolved traces and
    /// discovered annotations
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the man page in roff format
    Man,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the JSON on stdout stays clean for piping.
    // Default to warn, allowlist our crates.
    const CRATES: &[&str] = &["netdep", "netdep_extract", "netdep_match", "netdep_schemas"];
    let level = cli.verbose.tracing_level_filter();
    let allowlist = CRATES.iter().map(|c| format!("{c}={level}")).join(",");
    let filter = EnvFilter::new(format!("warn,{allowlist}"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    if let Some(Commands::Man) = cli.command {
        let man = clap_mangen::Man::new(Cli::command());
        man.render(&mut std::io::stdout().lock())?;
        return Ok(());
    }

    let mut config = AnalyserConfig::default().with_verbose(level >= LevelFilter::DEBUG);
    if let Some(path) = &cli.environment_variables {
        let env = read_env_file(path)
            .with_context(|| format!("cannot read environment file {}", path.display()))?;
        info!(services = env.len(), "loaded environment variables");
        config = config.with_env(env);
    }

    let loader: Box<dyn ProgramLoader> = match &cli.ssa_bridge {
        Some(command) => {
            debug!(command = %command.display(), "using SSA bridge");
            Box::new(BridgeLoader::new(command))
        }
        None => Box::new(DumpLoader),
    };

    let discovery = discover(
        &cli.project_directory,
        &cli.service_directory,
        loader.as_ref(),
        &config,
    )?;

    // Stdout must outlive the lock, so bind it first.
    let stdout = std::io::stdout();
    let mut writer: Box<dyn Write> = match &cli.output_filename {
        Some(path) => Box::new(BufWriter::new(create_output(path)?)),
        None => Box::new(stdout.lock()),
    };
    netdep_match::run(&discovery, &mut *writer)?;
    writer.flush()?;
    Ok(())
}

/// Creates (or truncates) the output file, readable by its owner only.
fn create_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        bail!("output directory {} does not exist", parent.display());
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("cannot create {}", path.display()))
}
