//! Aegis CLI - Invisible document watermarking and leak tracing.

use std::path::PathBuf;

use aegis_core::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

/// Key used when `--key` is not given.
pub const DEFAULT_KEY: &str = "1";

#[derive(Parser)]
#[command(name = "aegis")]
#[command(author, version, about = "Invisible document watermarking and leak tracing", long_about = None)]
#[command(after_help = "Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid arguments, existing identity)
  65  Data error (no watermark found, unknown tracking id, unreadable container)
  66  Cannot open input file
  74  I/O error (cannot write output)")]
struct Cli {
    /// Suppress decorated output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding identities, the ledger and the outbox
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed an invisible watermark into an image, PDF or PPTX
    Embed {
        /// Carrier to protect
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Where to write the protected copy
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Payload text to embed
        #[arg(short, long)]
        text: String,

        /// Secret key seeding the embedding
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,

        /// Append a signature trailer to the output
        #[arg(long)]
        sign: bool,

        /// Identity to sign with (defaults to "default")
        #[arg(long, requires = "sign")]
        identity: Option<String>,
    },

    /// Recover watermark evidence and check the signature
    Extract {
        /// Carrier to inspect
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Where to write the evidence image
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Secret key used at embedding time
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,
    },

    /// Manage signing identities
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Send an individually watermarked copy to each recipient
    Distribute {
        /// Document to distribute
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Recipient address (repeatable)
        #[arg(short, long = "recipient", value_name = "EMAIL", required = true)]
        recipients: Vec<String>,

        /// Secret key seeding the embedding
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,

        /// Sign every copy
        #[arg(long)]
        sign: bool,

        /// Identity to sign with (defaults to "default")
        #[arg(long, requires = "sign")]
        identity: Option<String>,

        /// Mail subject
        #[arg(long)]
        subject: Option<String>,
    },

    /// Identify the recipient of a leaked copy
    Trace {
        /// Leaked copy
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Tracking id fragment read off the evidence image
        #[arg(short, long)]
        fragment: String,

        /// Secret key used at distribution time
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,

        /// Where to write the evidence image
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show the detected carrier format of a file
    Sniff {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Generate a key pair and self-signed certificate
    Create {
        /// Signer display name
        #[arg(long)]
        name: String,

        /// Signer email address
        #[arg(long)]
        email: String,

        /// Identity id (defaults to "default")
        #[arg(long)]
        id: Option<String>,

        /// Replace an existing identity with the same id
        #[arg(long)]
        force: bool,
    },

    /// List stored identities
    List,
}

/// RUST_LOG wins; otherwise library and CLI events at info, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,aegis_core={level},aegis={level}")));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(home) = cli.home {
        config = config.with_home(home);
    }
    let quiet = cli.quiet;

    match cli.command {
        Commands::Embed {
            input,
            output,
            text,
            key,
            sign,
            identity,
        } => {
            let options = commands::embed::Options {
                text,
                key,
                sign,
                identity,
            };
            commands::embed::execute(&config, input, output, options, quiet).await
        }
        Commands::Extract { input, output, key } => {
            commands::extract::execute(&config, input, output, key, quiet).await
        }
        Commands::Identity { action } => match action {
            IdentityAction::Create {
                name,
                email,
                id,
                force,
            } => commands::identity::create(&config, name, email, id, force, quiet).await,
            IdentityAction::List => commands::identity::list(&config, quiet).await,
        },
        Commands::Distribute {
            input,
            recipients,
            key,
            sign,
            identity,
            subject,
        } => {
            let options = commands::distribute::Options {
                key,
                sign,
                identity,
                subject,
            };
            commands::distribute::execute(&config, input, recipients, options, quiet).await
        }
        Commands::Trace {
            input,
            fragment,
            key,
            output,
        } => commands::trace::execute(&config, input, fragment, key, output, quiet).await,
        Commands::Sniff { file } => commands::sniff::execute(file, quiet),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(e) => ExitCode::from_anyhow(&e),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
