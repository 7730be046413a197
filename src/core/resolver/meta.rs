// ─── Fabric / Quilt plans ───

use std::path::PathBuf;

use futures_util::stream::{self, StreamExt, TryStreamExt};

use super::{dedup_by_path, library_path, LoaderResolver, ResolveRequest, SelectedVersions};
use crate::core::catalog::{LaunchProfile, ProfileLibrary};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::maven::MavenArtifact;
use crate::core::model::{InstallTarget, LoaderKind};
use crate::core::plan::{
    Artifact, Checksum, ClientLayout, InstallPlan, JavaInvocation, LaunchEntry, PlanOutput,
    ServerLayout,
};

const SERVER_JAR: &str = "server.jar";
const SIDECAR_LOOKUPS: usize = 8;

pub(super) async fn plan(
    resolver: &LoaderResolver,
    kind: LoaderKind,
    selected: &SelectedVersions,
    request: &ResolveRequest,
) -> InstallerResult<InstallPlan> {
    let game = selected.game_version.as_str();
    let loader = selected.loader_version.as_str();

    let profile = resolver
        .client
        .fetch_launch_profile(kind, game, loader, request.target)
        .await?;

    let default_repo = match kind {
        LoaderKind::Quilt => resolver.client.endpoints().quilt_maven.clone(),
        _ => resolver.client.endpoints().fabric_maven.clone(),
    };

    let libraries: Vec<Artifact> = stream::iter(&profile.libraries)
        .map(|lib| library_artifact(resolver, lib, &default_repo))
        .buffered(SIDECAR_LOOKUPS)
        .try_collect()
        .await?;
    let libraries = dedup_by_path(libraries);

    match request.target {
        InstallTarget::Client => client_plan(kind, selected, request, profile, libraries),
        InstallTarget::Server => {
            server_plan(resolver, kind, selected, request, &profile, libraries).await
        }
    }
}

/// `{fabric-loader|quilt-loader}-{loader}-{game}`, used for the version
/// directory and the launcher profile key.
pub fn version_id(kind: LoaderKind, game: &str, loader: &str) -> String {
    format!("{}-{}-{}", kind.artifact_name(), loader, game)
}

fn client_plan(
    kind: LoaderKind,
    selected: &SelectedVersions,
    request: &ResolveRequest,
    mut profile: LaunchProfile,
    libraries: Vec<Artifact>,
) -> InstallerResult<InstallPlan> {
    let id = version_id(kind, &selected.game_version, &selected.loader_version);
    profile.id = id.clone();
    if profile.inherits_from.is_none() {
        profile.inherits_from = Some(selected.game_version.clone());
    }

    let output = PlanOutput::Client(ClientLayout {
        version_id: id.clone(),
        version_manifest: serde_json::to_value(&profile)?,
        profile_key: id,
        profile_name: format!("{}-{}", kind.artifact_name(), selected.game_version),
        icon: profile_icon(kind).into(),
    });

    InstallPlan::new(
        kind,
        &selected.game_version,
        &selected.loader_version,
        &request.root,
        libraries,
        output,
    )
}

fn profile_icon(kind: LoaderKind) -> &'static str {
    match kind {
        LoaderKind::Quilt => "Bookshelf",
        _ => "Furnace",
    }
}

async fn server_plan(
    resolver: &LoaderResolver,
    kind: LoaderKind,
    selected: &SelectedVersions,
    request: &ResolveRequest,
    profile: &LaunchProfile,
    libraries: Vec<Artifact>,
) -> InstallerResult<InstallPlan> {
    let game = selected.game_version.as_str();
    let loader = selected.loader_version.as_str();

    let download = resolver
        .client
        .fetch_vanilla_server(game)
        .await?
        .ok_or_else(|| {
            InstallerError::unsupported(
                kind,
                game,
                loader,
                "Mojang publishes no dedicated server for this game version",
            )
        })?;
    let server_id = format!("net.minecraft:server:{}", game);
    let checksum = Checksum::sha1(&download.sha1).ok_or_else(|| InstallerError::MissingChecksum {
        artifact: server_id.clone(),
    })?;
    let server_jar = Artifact {
        id: server_id,
        url: download.url,
        checksum,
        size: Some(download.size),
        path: PathBuf::from(SERVER_JAR),
    };

    let classpath = libraries.iter().map(|a| a.path.clone()).collect();
    let game_jar_property = match kind {
        LoaderKind::Quilt => "loader.gameJarPath",
        _ => "fabric.gameJarPath",
    };
    let settings = &resolver.server;
    let mut jvm_args = settings.jvm_args.clone();
    jvm_args.push(format!("-D{}={}", game_jar_property, SERVER_JAR));

    let launch = JavaInvocation {
        jvm_args,
        entry: LaunchEntry::MainClass {
            main_class: profile.main_class.clone(),
            classpath,
        },
        program_args: nogui_args(settings.nogui),
    };

    let mut artifacts = Vec::with_capacity(libraries.len() + 1);
    artifacts.push(server_jar);
    artifacts.extend(libraries);

    InstallPlan::new(
        kind,
        game,
        loader,
        &request.root,
        artifacts,
        PlanOutput::Server(ServerLayout {
            java: settings.java.clone(),
            launch,
            setup: None,
            script_stem: "start".into(),
        }),
    )
}

pub(super) fn nogui_args(nogui: bool) -> Vec<String> {
    if nogui {
        vec!["nogui".into()]
    } else {
        Vec::new()
    }
}

async fn library_artifact(
    resolver: &LoaderResolver,
    lib: &ProfileLibrary,
    default_repo: &str,
) -> InstallerResult<Artifact> {
    let coordinate = MavenArtifact::parse(&lib.name)?;
    let repo = lib
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(default_repo);
    let url = coordinate.url(repo);
    let checksum = resolver
        .checksum_for(&lib.name, &url, lib.sha256.as_deref(), lib.sha1.as_deref())
        .await?;

    Ok(Artifact {
        id: lib.name.clone(),
        url,
        checksum,
        size: lib.size,
        path: library_path(&coordinate),
    })
}
