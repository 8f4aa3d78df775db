use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aptrack::commands::*;

#[derive(Parser)]
#[command(name = "aptrack")]
#[command(about = "Inspect and maintain academic progress save files", long_about = None)]
struct Cli {
    /// Save file to use instead of the default location
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved snapshots
    History,
    /// Show the subjects and tasks of one snapshot
    Show {
        /// Snapshot index, as listed by `history`
        index: usize,
        /// Print as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Check that the save file loads cleanly
    Verify,
    /// Mark late tasks overdue and save the result as a new snapshot
    Sweep {
        /// Instant to check deadlines against (RFC 3339), defaults to now
        #[arg(short, long)]
        now: Option<String>,
        /// Description for the new snapshot
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aptrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::History) | None => cmd_history(cli.file),
        Some(Commands::Show { index, json }) => cmd_show(cli.file, index, json),
        Some(Commands::Verify) => cmd_verify(cli.file).map(|_| ()),
        Some(Commands::Sweep { now, label }) => cmd_sweep(cli.file, now, label, false).map(|_| ()),
        Some(Commands::Completions { shell }) => {
            let shell_enum = match shell.as_str() {
                "bash" => Shell::Bash,
                "zsh" => Shell::Zsh,
                "fish" => Shell::Fish,
                "powershell" => Shell::PowerShell,
                "elvish" => Shell::Elvish,
                _ => {
                    eprintln!("Unsupported shell: {}", shell);
                    std::process::exit(2);
                }
            };
            let mut cmd = Cli::command();
            generate(shell_enum, &mut cmd, "aptrack", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
