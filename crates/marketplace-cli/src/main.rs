//! JetBrains Marketplace command-line client.
//!
//! Downloads plugin archives, incrementally when an older copy is at hand,
//! and prepares the sidecar files a mirror needs to serve delta updates.
//!
//! # Examples
//!
//! ```bash
//! # Download a specific version into the current directory
//! marketplace download --plugin org.rust.lang --version 0.4.200
//!
//! # Update an existing archive, fetching only changed chunks
//! marketplace download --plugin org.rust.lang --version 0.4.201 \
//!     --to plugins/ --old-file plugins/intellij-rust-0.4.200.zip
//!
//! # Publish delta metadata next to an archive on a mirror
//! marketplace blockmap mirror/intellij-rust-0.4.201.zip
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use marketplace_cli::commands;
use marketplace_cli::commands::download::DownloadArgs;
use marketplace_client::CancellationToken;
use marketplace_core::ClientConfig;
use marketplace_core::cli::{ExitCode, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// JetBrains Marketplace client with block-map delta downloads.
#[derive(Parser, Debug)]
#[command(name = "marketplace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, text, pretty)
    #[arg(long = "format", global = true, default_value = "pretty")]
    format: String,

    /// Configuration file (defaults to <config dir>/marketplace/config.toml)
    #[arg(long, global = true, env = "MARKETPLACE_CONFIG")]
    config: Option<PathBuf>,

    /// Repository host, overriding the configuration file
    #[arg(long, global = true)]
    host: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a plugin archive.
    ///
    /// Select the artifact either by `--plugin` with `--version` or
    /// `--ide-build`, or by `--update-id`. With `--old-file`, only the
    /// chunks the old archive lacks are downloaded.
    Download {
        /// Plugin id from plugin.xml
        #[arg(long, conflicts_with = "update_id", required_unless_present = "update_id")]
        plugin: Option<String>,

        /// Exact plugin version
        #[arg(long, requires = "plugin", conflicts_with = "ide_build")]
        version: Option<String>,

        /// Newest version compatible with this IDE build
        #[arg(long, requires = "plugin")]
        ide_build: Option<String>,

        /// Release channel (empty or _default_ for the default channel)
        #[arg(long, requires = "plugin")]
        channel: Option<String>,

        /// Update id of a specific upload
        #[arg(long)]
        update_id: Option<u32>,

        /// Target file or directory
        #[arg(long, default_value = ".")]
        to: PathBuf,

        /// Older copy of the archive to reuse content from
        #[arg(long)]
        old_file: Option<PathBuf>,
    },

    /// Write the block map and hash sidecars for an archive.
    Blockmap {
        /// Archive to describe
        file: PathBuf,

        /// Digest algorithm (SHA-256, SHA-512, BLAKE3)
        #[arg(long)]
        algorithm: Option<String>,

        /// Directory for the sidecars (defaults to the archive's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Show what a delta download from OLD to NEW would transfer.
    Plan {
        /// Archive already on disk
        old: PathBuf,

        /// Archive to update to
        new: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let output_format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.host = host;
        config.validate()?;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let exit_code = execute_command(cli.command, &config, cancel, output_format).await?;

    std::process::exit(exit_code.as_i32());
}

/// Initializes logging infrastructure.
///
/// Logs go to stderr so command output on stdout stays parseable.
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}

/// Routes a command to its handler and returns the exit code.
async fn execute_command(
    command: Commands,
    config: &ClientConfig,
    cancel: CancellationToken,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match command {
        Commands::Download {
            plugin,
            version,
            ide_build,
            channel,
            update_id,
            to,
            old_file,
        } => {
            let args = DownloadArgs {
                plugin,
                version,
                ide_build,
                channel,
                update_id,
                to,
                old_file,
            };
            commands::download::run(&args, config, cancel, output_format).await
        }
        Commands::Blockmap {
            file,
            algorithm,
            out_dir,
        } => commands::blockmap::run(file, algorithm.as_deref(), out_dir, output_format).await,
        Commands::Plan { old, new } => {
            commands::plan::run(old, new, config, output_format).await
        }
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            commands::completions::run(shell, &mut cmd).await
        }
    }
}
