use clap::{Parser, Subcommand};
use rollbookd::{api, db, seed};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollbookd", version, about = "School attendance management API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Directory holding the workspace database.
        #[arg(long, default_value = "./data")]
        workspace: PathBuf,
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8001")]
        bind: SocketAddr,
        /// Load the demo dataset before serving.
        #[arg(long)]
        seed_sample: bool,
    },
    /// Ensure the schema and core rows exist, then exit.
    Seed {
        #[arg(long, default_value = "./data")]
        workspace: PathBuf,
        /// Also load the demo dataset.
        #[arg(long)]
        sample: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rollbookd=info,tower_http=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve {
            workspace,
            bind,
            seed_sample,
        } => {
            let conn = db::open_db(&workspace)?;
            // Login is useless without roles and the bootstrap admin.
            seed::seed_core(&conn)?;
            if seed_sample {
                seed::seed_sample(&conn)?;
            }

            let app = api::router(api::AppState::new(conn));
            let listener = tokio::net::TcpListener::bind(bind).await?;
            tracing::info!(%bind, workspace = %workspace.display(), "listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Seed { workspace, sample } => {
            let conn = db::open_db(&workspace)?;
            if sample {
                seed::seed_sample(&conn)?;
            } else {
                seed::seed_core(&conn)?;
            }
            tracing::info!(workspace = %workspace.display(), sample, "seed complete");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
}
