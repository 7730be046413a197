// ─── Loader installer core ───
// Installs Fabric, Forge and Quilt onto Minecraft clients and dedicated servers.
//
// Architecture:
//   core/
//     model/         LoaderKind, InstallTarget
//     plan/          Artifact, Checksum, InstallPlan + output layouts
//     catalog/       Version catalogs per loader (Fabric/Quilt meta, Forge maven)
//     resolver/      Version policies + plan construction per loader
//     downloader/    Concurrent verified downloads, integrity checks
//     writer/        Launcher profile store, server launch scripts, file lock
//     orchestrator/  Linear install state machine
//     version/       Mojang manifest + version JSON + OS rules
//     maven/         Coordinates, repository layout, maven-metadata.xml
//     http/          Transport trait + bounded retry
//     config/        User configuration and default paths
//     progress/      Stage and per-artifact progress events

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod maven;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod resolver;
pub mod version;
pub mod writer;
