//! Command line shell around the install engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info, warn};

use crate::core::config::{default_minecraft_dir, InstallerConfig};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::model::{InstallTarget, LoaderKind};
use crate::core::orchestrator::{InstallOrchestrator, InstallOutput, InstallRequest, InstallResult};
use crate::core::progress::{InstallProgress, ProgressCallback};
use crate::core::resolver::select_versions;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "loader-installer", about, version)]
pub struct Cli {
    /// Configuration file (JSON). Defaults to the per-user config.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install a loader onto a client or a dedicated server.
    Install(InstallArgs),
    /// Show the newest game and loader versions in a loader's catalog.
    Versions {
        loader: LoaderKind,
        #[arg(long)]
        game_version: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// fabric, forge or quilt
    pub loader: LoaderKind,
    #[arg(long, default_value_t = InstallTarget::Client)]
    pub target: InstallTarget,
    #[arg(long)]
    pub game_version: Option<String>,
    #[arg(long)]
    pub loader_version: Option<String>,
    /// Minecraft directory (client) or server directory (server).
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Launcher profile store, when it is not inside the Minecraft directory.
    #[arg(long)]
    pub profiles: Option<PathBuf>,
    /// Client: place the version files but leave the launcher profiles alone.
    #[arg(long, conflicts_with = "no_script")]
    pub no_profile: bool,
    /// Server: place the artifacts but do not write a start script.
    #[arg(long)]
    pub no_script: bool,
}

pub async fn execute(cli: Cli) -> ExitCode {
    let orchestrator = match InstallerConfig::load(cli.config.as_deref())
        .and_then(InstallOrchestrator::new)
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match cli.command {
        Command::Install(args) => install(&orchestrator, args).await,
        Command::Versions {
            loader,
            game_version,
            limit,
        } => match versions(&orchestrator, loader, game_version.as_deref(), limit).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::from(EXIT_FAILURE)
            }
        },
    }
}

async fn install(orchestrator: &InstallOrchestrator, args: InstallArgs) -> ExitCode {
    let destination = match destination_for(args.target, args.dir) {
        Ok(dir) => dir,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let request = InstallRequest {
        loader: args.loader,
        target: args.target,
        game_version: args.game_version,
        loader_version: args.loader_version,
        destination,
        profile_store: args.profiles,
        generate: match args.target {
            InstallTarget::Client => !args.no_profile,
            InstallTarget::Server => !args.no_script,
        },
    };
    let result = orchestrator.run(request, log_progress()).await;
    report(&result)
}

fn destination_for(target: InstallTarget, dir: Option<PathBuf>) -> InstallerResult<PathBuf> {
    if let Some(dir) = dir {
        return Ok(dir);
    }
    match target {
        InstallTarget::Client => default_minecraft_dir().ok_or_else(|| {
            InstallerError::InvalidConfig("cannot locate the Minecraft directory; pass --dir".into())
        }),
        InstallTarget::Server => Ok(std::env::current_dir()?.join("server")),
    }
}

fn log_progress() -> ProgressCallback {
    let finished = Arc::new(AtomicUsize::new(0));
    Arc::new(move |event: &InstallProgress| match event {
        InstallProgress::ArtifactFinished { id, skipped } => {
            let n = finished.fetch_add(1, Ordering::Relaxed) + 1;
            if *skipped {
                debug!("[{}] {} already present", n, id);
            } else {
                info!("[{}] {}", n, id);
            }
        }
        InstallProgress::Retrying {
            target,
            attempt,
            delay,
        } => warn!("Retrying {} (attempt {}) in {:?}", target, attempt, delay),
        _ => {}
    })
}

fn report(result: &InstallResult) -> ExitCode {
    if let Some(failure) = &result.failure {
        if result.is_cancelled() {
            eprintln!("Installation cancelled. Re-run to resume.");
            return ExitCode::from(EXIT_CANCELLED);
        }
        eprintln!(
            "Installation failed at stage '{}': {}",
            failure.stage.description(),
            failure.error
        );
        return ExitCode::from(EXIT_FAILURE);
    }

    println!(
        "Installed {} {} for Minecraft {} ({}): {} downloaded, {} already present",
        result.loader.display_name(),
        result.loader_version.as_deref().unwrap_or("?"),
        result.game_version.as_deref().unwrap_or("?"),
        result.target,
        result.downloaded,
        result.skipped
    );
    match &result.output {
        Some(InstallOutput::Profile { key, store, .. }) => {
            println!("Launcher profile '{}' written to {}", key, store.display());
        }
        Some(InstallOutput::Version { id, version_dir }) => {
            println!("Version {} written to {}", id, version_dir.display());
        }
        Some(InstallOutput::Server(layout)) => {
            println!("Server ready in {}", layout.root.display());
            if let Some(script) = &layout.script {
                println!("Start it with {}", script.display());
            }
        }
        None => {}
    }
    ExitCode::SUCCESS
}

async fn versions(
    orchestrator: &InstallOrchestrator,
    loader: LoaderKind,
    game_version: Option<&str>,
    limit: usize,
) -> InstallerResult<()> {
    let catalog = orchestrator.catalog(loader).await?;

    println!("{} game versions:", loader.display_name());
    for game in catalog.game_versions().iter().take(limit) {
        println!("  {}{}", game.id, if game.stable { "" } else { " (unstable)" });
    }

    let loaders: Vec<_> = match game_version {
        Some(game) => catalog.loaders_for_game(game),
        None => catalog.loader_versions().iter().collect(),
    };
    println!("{} loader versions:", loader.display_name());
    for entry in loaders.into_iter().take(limit) {
        println!(
            "  {}{}",
            entry.version,
            if entry.stable { " (stable)" } else { "" }
        );
    }

    let selected = select_versions(&catalog, game_version, None)?;
    println!(
        "Default: {} {} for Minecraft {}",
        loader.display_name(),
        selected.loader_version,
        selected.game_version
    );
    Ok(())
}
