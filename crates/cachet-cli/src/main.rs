mod commands;

use cachet_hash::DigestAlgorithm;
use clap::{Parser, Subcommand};
use commands::{EXIT_FAILURE, EXIT_INTEGRITY};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cachet",
    version,
    about = "Inspect, verify and hash cachet envelope files"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Hasher config file (defaults to ~/.config/cachet/hasher.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the resources referenced by an envelope file.
    Inspect {
        /// Envelope JSON file.
        file: PathBuf,
    },
    /// Re-read every resource in an envelope file and check its content hash.
    Verify {
        /// Envelope JSON file.
        file: PathBuf,
    },
    /// Compute the cache key of the arguments stored in an envelope file.
    ///
    /// A top-level list is taken as positional arguments and a top-level
    /// object as named arguments. Anything else is a single positional
    /// argument.
    Hash {
        /// Envelope JSON file.
        file: PathBuf,
        /// Digest algorithm (overrides the config file).
        #[arg(long)]
        algorithm: Option<DigestAlgorithm>,
        /// Hash as a pipeline step with this identifier.
        #[arg(long, requires = "code")]
        task: Option<String>,
        /// Source file of the step's code, used with --task.
        #[arg(long, requires = "task")]
        code: Option<PathBuf>,
    },
    /// Show the hasher config, or change its digest algorithm.
    Config {
        /// Store this algorithm in the config file.
        #[arg(long)]
        set_algorithm: Option<DigestAlgorithm>,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CACHET_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Inspect { file } => commands::inspect::run(&file, json_output),
        Commands::Verify { file } => commands::verify::run(&file, json_output),
        Commands::Hash {
            file,
            algorithm,
            task,
            code,
        } => commands::hash::run(
            &file,
            algorithm,
            task.as_deref().zip(code.as_deref()),
            config_path,
            json_output,
        ),
        Commands::Config { set_algorithm } => {
            commands::config::run(config_path, set_algorithm, json_output)
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("integrity error:") {
                EXIT_INTEGRITY
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
