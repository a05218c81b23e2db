//! GroveGrab CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use grove_foundation::{ConfigStore, ConfigUpdate, JsonStore};
use grove_task::{EngineConfig, TaskEngine, TaskStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// GroveGrab - download Spotify tracks, albums and playlists
#[derive(Parser, Debug)]
#[command(name = "grovegrab")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Download tool to launch
    #[arg(long, global = true, value_name = "PROGRAM")]
    tool: Option<String>,

    /// Settings directory (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a track, album, playlist or artist
    Download {
        url: String,

        /// Target directory (defaults to the configured download path)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Fetch metadata only
    Preload { url: String },
    /// Check that a URL is a supported Spotify link
    Validate { url: String },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check that the download tool and ffmpeg are installed
    Check,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings (credentials are never shown)
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Update one or more settings
    Set {
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
        #[arg(long)]
        redirect_uri: Option<String>,
        #[arg(long)]
        download_path: Option<PathBuf>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        quality: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = match &args.config_dir {
        Some(dir) => ConfigStore::open(JsonStore::new(dir))?,
        None => ConfigStore::open_global()?,
    };
    let settings = Arc::new(settings);

    let mut engine_config = EngineConfig::default();
    if let Some(tool) = &args.tool {
        engine_config = engine_config.tool(tool.clone());
    }
    let engine = TaskEngine::new(settings, engine_config);

    match args.command {
        Command::Download { url, path } => {
            engine.validate_url(&url)?;
            let id = engine.download(url, path);
            run_to_end(&engine, id).await
        }
        Command::Preload { url } => {
            engine.validate_url(&url)?;
            let id = engine.preload(url);
            run_to_end(&engine, id).await
        }
        Command::Validate { url } => {
            let link = engine.validate_url(&url)?;
            println!("✓ Valid {} link: {}", link.kind, link.id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            config_cmd(&engine, action)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => Ok(check_cmd(&engine)),
    }
}

/// Follow a task in the foreground and map its final status to an exit code
async fn run_to_end(engine: &TaskEngine, id: grove_task::TaskId) -> anyhow::Result<ExitCode> {
    let record = cli::follow(engine, id).await?;

    match record.status {
        TaskStatus::Completed => {
            if record.failed_tracks > 0 {
                println!("\n{} track(s) failed:", record.failed_tracks);
                for line in &record.failed_track_list {
                    println!("  {}", line);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::FAILURE),
    }
}

fn config_cmd(engine: &TaskEngine, action: ConfigAction) -> anyhow::Result<()> {
    let settings = engine.settings();

    match action {
        ConfigAction::Show { json } => {
            let view = settings.snapshot().public_view();
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("\n⚙ Settings\n");
                println!(
                    "  Credentials:   {}",
                    if view.has_credentials { "configured" } else { "missing" }
                );
                println!("  Download path: {}", view.default_download_path.display());
                println!("  Format:        {}", view.audio_format);
                println!("  Quality:       {}", view.audio_quality);
            }
        }
        ConfigAction::Set {
            client_id,
            client_secret,
            redirect_uri,
            download_path,
            format,
            quality,
        } => {
            let update = ConfigUpdate {
                client_id,
                client_secret,
                redirect_uri,
                download_path,
                audio_format: format,
                audio_quality: quality,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update; pass at least one option");
            }
            settings.update(&update)?;
            println!("✓ Settings saved");
        }
    }

    Ok(())
}

fn check_cmd(engine: &TaskEngine) -> ExitCode {
    let report = engine.check_dependencies();

    for dep in [&report.tool, &report.ffmpeg] {
        match &dep.path {
            Some(path) => println!("✓ {:<8} {}", dep.name, path.display()),
            None => println!("✗ {:<8} not found on PATH", dep.name),
        }
    }

    if report.all_available() {
        ExitCode::SUCCESS
    } else {
        println!("\nMissing: {}", report.missing().join(", "));
        ExitCode::FAILURE
    }
}
