//! MediaVault - CLI
//!
//! Command-line interface for vault operations.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use mediavault::{RotationState, VaultConfig, VaultError, VaultSession};

#[derive(Parser)]
#[command(name = "mediavault")]
#[command(version = mediavault::VERSION)]
#[command(about = "Per-file encrypted media vault with crash-safe password rotation")]
struct Cli {
    /// Vault path
    #[arg(short, long, default_value = "./vault")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault
    Init,

    /// Show vault and rotation status
    Status,

    /// Import a file into the vault
    Add {
        /// Source file
        path: PathBuf,

        /// Securely erase the plaintext source after import
        #[arg(long)]
        wipe_source: bool,
    },

    /// List vault contents
    List,

    /// Export a file from the vault
    Get {
        /// Media id
        id: String,

        /// Output path
        output: PathBuf,
    },

    /// Change the vault password
    Rotate,

    /// Recover an interrupted or failed password rotation
    Recover,

    /// Securely erase an arbitrary file
    Shred {
        /// File to erase
        path: PathBuf,

        /// Overwrite passes
        #[arg(long, default_value_t = 3)]
        passes: u32,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    rpassword::prompt_password(label).context("reading password")
}

fn unlock_session(vault: &PathBuf) -> anyhow::Result<VaultSession> {
    let session = VaultSession::open(vault)?;
    let password = prompt("Password: ")?;
    session.unlock(&password)?;
    Ok(session)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init => {
            let password = prompt("New password: ")?;
            let confirm = prompt("Confirm password: ")?;
            if password != confirm {
                bail!("passwords do not match");
            }

            let (_session, phrase) =
                VaultSession::setup(&cli.vault, &password, VaultConfig::default())?;

            println!("Vault created at: {}", cli.vault.display());
            println!();
            println!("Recovery phrase (write it down, it is shown only once):");
            println!();
            for (i, word) in phrase.words().iter().enumerate() {
                println!("  {:>2}. {word}", i + 1);
            }
        }

        Commands::Status => {
            let session = VaultSession::open(&cli.vault)?;
            match session.rotation_state()? {
                RotationState::Idle => println!("Rotation: idle"),
                RotationState::InProgress => {
                    println!("Rotation: INTERRUPTED - unlock is blocked");
                    println!("Run `mediavault recover` with the old and new passwords.");
                }
                RotationState::Failed => {
                    println!("Rotation: FAILED - unlock is blocked");
                    println!("Run `mediavault recover` with the old and new passwords.");
                }
            }
            println!(
                "Session: {}",
                if session.is_unlocked() {
                    "unlocked"
                } else {
                    "locked"
                }
            );
        }

        Commands::Add { path, wipe_source } => {
            let session = unlock_session(&cli.vault)?;
            let id = session.import_file(&path, wipe_source)?;
            println!("Imported {} as {id}", path.display());
            if wipe_source {
                println!("Source securely erased.");
            }
        }

        Commands::List => {
            let session = unlock_session(&cli.vault)?;
            let items = session.list_media()?;

            if items.is_empty() {
                println!("Vault is empty");
            } else {
                println!("Vault contents ({}):", items.len());
                for (id, meta) in items {
                    println!(
                        "  {id}  {}  {}  {}",
                        meta.created_at.format("%Y-%m-%d %H:%M"),
                        meta.mime_type,
                        meta.original_name
                    );
                }
            }
        }

        Commands::Get { id, output } => {
            let session = unlock_session(&cli.vault)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let written = runtime.block_on(session.export_media(&id, &output))?;
            println!("Exported {written} bytes to {}", output.display());
        }

        Commands::Rotate => {
            let session = VaultSession::open(&cli.vault)?;
            let old = prompt("Current password: ")?;
            let new = prompt("New password: ")?;
            let confirm = prompt("Confirm new password: ")?;
            if new != confirm {
                bail!("passwords do not match");
            }

            match session.change_password_safely(&old, &new) {
                Ok(()) => println!("Password changed."),
                Err(e @ VaultError::RotationFailed(_)) => {
                    eprintln!("{e}");
                    bail!("rotation failed; the journal keeps the vault recoverable");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Recover => {
            let session = VaultSession::open(&cli.vault)?;
            let old = prompt("Old password: ")?;
            let new = prompt("New password: ")?;
            session.recover_rotation(&old, &new)?;
            println!("Rotation recovered; vault is consistent.");
        }

        Commands::Shred { path, passes } => {
            mediavault::secure_erase(&path, passes)?;
            println!("Erased {}", path.display());
        }
    }

    Ok(())
}
