use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use musicdb::catalog_store::{verify_integrity, CatalogStore, SqliteCatalogStore};
use musicdb::config::{AppConfig, CliConfig, FileConfig};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "musicdb", about = "Music catalog database maintenance")]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(value_parser = parse_path)]
    db_path: Option<PathBuf>,

    /// Path to a TOML config file; file values override CLI flags.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Number of read-only connections in the pool.
    #[clap(long, default_value_t = 4)]
    read_pool_size: usize,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database file and schema if missing, then validate it.
    Init,
    /// Print row counts per table.
    Stats {
        /// Emit the counts as JSON.
        #[clap(long)]
        json: bool,
    },
    /// Re-verify every catalog invariant with a full scan.
    Check,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(
        &CliConfig {
            db_path: cli_args.db_path.clone(),
            read_pool_size: cli_args.read_pool_size,
        },
        file_config,
    )?;

    info!("Opening catalog database at {:?}", config.db_path);
    let store = SqliteCatalogStore::open(&config.db_path, config.read_pool_size)?;

    match cli_args.command {
        Command::Init => {
            info!("Catalog database ready at {:?}", config.db_path);
        }
        Command::Stats { json } => {
            let counts = store.counts()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("artists:     {}", counts.artists);
                println!("genres:      {}", counts.genres);
                println!("albums:      {}", counts.albums);
                println!("songs:       {}", counts.songs);
                println!("users:       {}", counts.users);
                println!("ratings:     {}", counts.ratings);
                println!("song_genres: {}", counts.song_genres);
            }
        }
        Command::Check => {
            let findings = verify_integrity(&store)?;
            if findings.is_empty() {
                info!("No integrity violations found");
            } else {
                for finding in &findings {
                    eprintln!("{}", finding);
                }
                anyhow::bail!("{} integrity violation(s) found", findings.len());
            }
        }
    }

    Ok(())
}
