// ─── Forge plans ───
// Only dedicated servers are planned. The installer's processors (which patch
// the game jar) are run by the generated script's one-time setup step.

use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::meta::nogui_args;
use super::{dedup_by_path, LoaderResolver, ResolveRequest, SelectedVersions, LIBRARIES_DIR};
use crate::core::catalog::forge::installer_artifact;
use crate::core::catalog::ForgeLibrarySource;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::model::{InstallTarget, LoaderKind};
use crate::core::plan::{
    Artifact, InstallPlan, JavaInvocation, LaunchEntry, PlanOutput, ServerLayout, SetupStep,
};
use crate::core::version::is_at_least;
use crate::core::writer::write_atomic;

const SIDECAR_LOOKUPS: usize = 8;
/// First release whose server launches through JVM argument files.
const ARGFILE_MINOR: u64 = 17;

pub(super) async fn plan(
    resolver: &LoaderResolver,
    selected: &SelectedVersions,
    request: &ResolveRequest,
) -> InstallerResult<InstallPlan> {
    let game = selected.game_version.as_str();
    let loader = selected.loader_version.as_str();

    if request.target == InstallTarget::Client {
        return Err(InstallerError::unsupported(
            LoaderKind::Forge,
            game,
            loader,
            "client installs need the Forge installer's processors; use the official installer",
        ));
    }

    let installer = installer_artifact(game, loader);
    let installer_path = PathBuf::from(installer.filename());
    let cached = request.root.join(&installer_path);

    let manifest = resolver
        .client
        .fetch_forge_installer(game, loader, Some(&cached))
        .await?;

    if manifest.legacy {
        return Err(InstallerError::unsupported(
            LoaderKind::Forge,
            game,
            loader,
            "legacy installer format (pre-1.13) is not supported",
        ));
    }
    if let Some(declared) = manifest.minecraft.as_deref() {
        if declared != game {
            return Err(InstallerError::unsupported(
                LoaderKind::Forge,
                game,
                loader,
                format!("installer targets Minecraft {}", declared),
            ));
        }
    }

    // Keep the verified jar so the fetch stage finds it in place.
    if let Some(bytes) = &manifest.downloaded {
        write_atomic(&cached, bytes).await?;
        debug!("Cached Forge installer at {:?}", cached);
    }

    let sources = manifest.downloadable_libraries();
    debug!("Forge {}-{} declares {} libraries", game, loader, sources.len());
    let libraries: Vec<Artifact> = stream::iter(&sources)
        .map(|source| library_artifact(resolver, source))
        .buffered(SIDECAR_LOOKUPS)
        .try_collect()
        .await?;

    let mut artifacts = vec![Artifact {
        id: installer.to_string(),
        url: manifest.installer_url.clone(),
        checksum: manifest.installer_checksum.clone(),
        size: Some(manifest.installer_size),
        path: installer_path.clone(),
    }];
    artifacts.extend(libraries);
    let artifacts = dedup_by_path(artifacts);

    let settings = &resolver.server;
    let setup = SetupStep {
        invocation: JavaInvocation {
            jvm_args: Vec::new(),
            entry: LaunchEntry::Jar {
                jar: installer_path,
            },
            program_args: vec!["--installServer".into()],
        },
        marker: PathBuf::from(format!(".forge-{}-{}.installed", game, loader)),
    };

    let launch = JavaInvocation {
        jvm_args: settings.jvm_args.clone(),
        entry: launch_entry(game, loader),
        program_args: nogui_args(settings.nogui),
    };

    InstallPlan::new(
        LoaderKind::Forge,
        game,
        loader,
        &request.root,
        artifacts,
        PlanOutput::Server(ServerLayout {
            java: settings.java.clone(),
            launch,
            setup: Some(setup),
            script_stem: "start".into(),
        }),
    )
}

/// 1.17+ servers start from the argument files the installer writes;
/// older ones from the patched `forge-GAME-LOADER.jar`.
fn launch_entry(game: &str, loader: &str) -> LaunchEntry {
    if is_at_least(game, ARGFILE_MINOR) {
        let dir = Path::new(LIBRARIES_DIR)
            .join("net")
            .join("minecraftforge")
            .join("forge")
            .join(format!("{}-{}", game, loader));
        LaunchEntry::ArgFiles {
            unix: dir.join("unix_args.txt"),
            windows: dir.join("win_args.txt"),
        }
    } else {
        LaunchEntry::Jar {
            jar: PathBuf::from(format!("forge-{}-{}.jar", game, loader)),
        }
    }
}

async fn library_artifact(
    resolver: &LoaderResolver,
    source: &ForgeLibrarySource,
) -> InstallerResult<Artifact> {
    let checksum = resolver
        .checksum_for(&source.path, &source.url, None, source.sha1.as_deref())
        .await?;
    let relative: PathBuf = source.path.split('/').filter(|p| !p.is_empty()).collect();
    Ok(Artifact {
        id: source.path.clone(),
        url: source.url.clone(),
        checksum,
        size: source.size,
        path: Path::new(LIBRARIES_DIR).join(relative),
    })
}
