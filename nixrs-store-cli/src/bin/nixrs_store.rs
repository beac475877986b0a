use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nixrs::store::legacy_worker::LegacyStoreBuilder;
use nixrs::store_path::StorePathSet;
use nixrs_store_cli::{build, substitute, verify_path};
use tracing_subscriber::EnvFilter;

/// Smoke-test commands against the Nix worker protocol, run over a local
/// `nix-store --serve` child process.
#[derive(Debug, Parser)]
#[command(name = "nixrs-store")]
struct Cli {
    /// Program used to speak the legacy worker protocol, run as
    /// `<program> --serve` (optionally `--write`).
    #[arg(long, default_value = "nix-store")]
    remote_program: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-dump each path's NAR and compare it against the registered hash.
    VerifyPath { paths: Vec<PathBuf> },
    /// Build a `.drv` file through the connected store.
    Build { drv_path: PathBuf },
    /// Copy paths (and their closure) from a substituter program into the
    /// local store's worker.
    Substitute {
        #[arg(long)]
        substituter_program: String,
        paths: Vec<PathBuf>,
    },
}

async fn connect(program: &str, write: bool) -> Result<impl nixrs::store::Store, nixrs::store::Error> {
    let mut b = LegacyStoreBuilder::new(program);
    b.command_mut().arg("--serve");
    if write {
        b.command_mut().arg("--write");
    }
    b.connect().await
}

#[tokio::main]
async fn main() -> Result<(), nixrs::store::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::VerifyPath { paths } => {
            let store = connect(&cli.remote_program, false).await?;
            verify_path::verify_path(store, &paths).await?;
        }
        Command::Build { drv_path } => {
            let store = connect(&cli.remote_program, true).await?;
            build::build(store, &drv_path).await?;
        }
        Command::Substitute {
            substituter_program,
            paths,
        } => {
            let local = connect(&cli.remote_program, true).await?;
            let substituter = connect(&substituter_program, false).await?;
            let store_dir = local.store_dir();
            let mut store_paths = StorePathSet::new();
            for path in &paths {
                store_paths.insert(store_dir.follow_links_to_store_path(path).await?);
            }
            substitute::substitute(substituter, local, store_paths).await?;
        }
    }
    Ok(())
}
