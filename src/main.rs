use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;

use parley_core::archive::ArchiveStore;
use parley_core::verify::IdentityVerifier;
use parley_server::{ServerConfig, TokenVerifier};
use parley_store::{Database, SqliteArchive};

#[derive(Parser)]
#[command(name = "parley", about = "Anonymous pair-chat relay server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Path to the archive database. Defaults to ~/.parley/archive.db.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting parley");

    let secret = std::env::var("PARLEY_SECRET")
        .map(SecretString::from)
        .context("PARLEY_SECRET must be set")?;

    let db_path = match args.db {
        Some(path) => path,
        None => dirs_home().join(".parley").join("archive.db"),
    };
    let db = Database::open(&db_path).context("failed to open archive database")?;

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(TokenVerifier::new(&secret));
    let archive: Arc<dyn ArchiveStore> = Arc::new(SqliteArchive::new(db));

    let config = ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = parley_server::start(config, verifier, archive)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "parley ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
