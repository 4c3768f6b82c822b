//! plx-engine command line
//!
//! Operator tooling over a playlist database: initialize it, print a
//! playlist in play order, verify its chain, render it, or list the
//! playlists that embed it. Output is JSON on stdout.
//!
//! **Usage:**
//! ```bash
//! plx-engine [--root-folder <dir>] <init|materialize|verify|render|ancestors> [args]
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use plx_common::config::{resolve_root_folder, EngineConfig, ROOT_FOLDER_ENV};
use plx_engine::PlaylistEngine;

#[derive(Parser, Debug)]
#[clap(name = "plx-engine")]
#[clap(about = "Playlist composition and integrity engine")]
struct Args {
    /// Root folder holding plx.toml and the database
    #[clap(long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database
    Init,
    /// Print a playlist's items in play order
    Materialize { playlist_id: Uuid },
    /// Check a playlist's chain for corruption
    Verify { playlist_id: Uuid },
    /// Resolve every item of a playlist for rendering
    Render {
        playlist_id: Uuid,
        /// Organization to resolve integrations for (defaults to the owner)
        #[clap(long)]
        organization_id: Option<String>,
    },
    /// List playlists that embed a playlist, directly or transitively
    Ancestors { playlist_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("plx_engine=info,plx_common=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Starting plx-engine v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, Some("root_folder"))
        .context("Failed to resolve root folder")?;
    let config = EngineConfig::load(&root_folder)
        .with_context(|| format!("Failed to load configuration from {}", root_folder.display()))?;

    let engine = PlaylistEngine::open(config)
        .await
        .context("Failed to open playlist database")?;

    match args.command {
        Command::Init => {
            info!("Database ready at {}", engine.config().database_path.display());
        }
        Command::Materialize { playlist_id } => {
            let items = engine
                .materialize(playlist_id)
                .await
                .with_context(|| format!("Failed to materialize playlist {}", playlist_id))?;
            print_json(&items)?;
        }
        Command::Verify { playlist_id } => {
            let report = engine
                .verify_chain(playlist_id)
                .await
                .with_context(|| format!("Playlist {} failed verification", playlist_id))?;
            print_json(&report)?;
        }
        Command::Render {
            playlist_id,
            organization_id,
        } => {
            let organization_id = match organization_id {
                Some(organization_id) => organization_id,
                None => engine.get_playlist(playlist_id).await?.organization_id,
            };
            let items = engine
                .render_playlist(playlist_id, &organization_id)
                .await
                .with_context(|| format!("Failed to render playlist {}", playlist_id))?;
            print_json(&items)?;
        }
        Command::Ancestors { playlist_id } => {
            let mut ancestors: Vec<Uuid> = engine.ancestors(playlist_id).await?.into_iter().collect();
            ancestors.sort();
            print_json(&ancestors)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
