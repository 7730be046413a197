use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{ensure_present, write_atomic, FileLock, DEFAULT_LOCK_WAIT};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::{ClientLayout, InstallPlan, PlanOutput};

pub const PROFILE_STORE_FILE: &str = "launcher_profiles.json";
const VERSIONS_DIR: &str = "versions";

/// Registers a client install with the vanilla launcher.
#[derive(Debug, Clone)]
pub struct ClientProfileWriter {
    store: PathBuf,
}

impl ClientProfileWriter {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self {
            store: store.into(),
        }
    }

    /// The store the launcher keeps in its own directory.
    pub fn for_minecraft_dir(dir: &Path) -> Self {
        Self::new(dir.join(PROFILE_STORE_FILE))
    }

    pub fn store_path(&self) -> &Path {
        &self.store
    }

    /// Write the version files and upsert the profile entry.
    /// Returns the profile key.
    pub async fn write_profile(&self, plan: &InstallPlan) -> InstallerResult<String> {
        let layout = client_layout(plan)?;
        write_version_files(plan).await?;

        let _lock = FileLock::acquire(&self.store, DEFAULT_LOCK_WAIT).await?;
        let mut store = self.read_store().await?;
        let before = store.clone();
        upsert_profile(&mut store, layout, &timestamp())
            .map_err(|reason| InstallerError::write_failed(&self.store, reason))?;

        if store == before {
            debug!("Profile {} already up to date", layout.profile_key);
        } else {
            write_atomic(&self.store, &serde_json::to_vec_pretty(&store)?).await?;
            info!("Profile {} saved to {:?}", layout.profile_key, self.store);
        }
        Ok(layout.profile_key.clone())
    }

    async fn read_store(&self) -> InstallerResult<Value> {
        match tokio::fs::read(&self.store).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                InstallerError::write_failed(
                    &self.store,
                    format!("existing profile store is not valid JSON: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating profile store {:?}", self.store);
                Ok(empty_store())
            }
            Err(e) => Err(InstallerError::write_failed(&self.store, e)),
        }
    }
}

fn client_layout(plan: &InstallPlan) -> InstallerResult<&ClientLayout> {
    match plan.output() {
        PlanOutput::Client(layout) => Ok(layout),
        _ => Err(InstallerError::write_failed(
            plan.root(),
            "plan does not describe a client install",
        )),
    }
}

/// Write `versions/<id>/<id>.json` and its placeholder jar, without touching
/// the profile store. Returns the version id.
pub async fn write_version_files(plan: &InstallPlan) -> InstallerResult<String> {
    let layout = client_layout(plan)?;
    ensure_present(plan.root(), plan.artifacts()).await?;

    let version_dir = plan.root().join(VERSIONS_DIR).join(&layout.version_id);
    let manifest = serde_json::to_vec_pretty(&layout.version_manifest)?;
    write_atomic(
        &version_dir.join(format!("{}.json", layout.version_id)),
        &manifest,
    )
    .await?;
    // The launcher expects a jar next to the JSON even though the game
    // jar comes from the inherited version.
    write_atomic(&version_dir.join(format!("{}.jar", layout.version_id)), &[]).await?;
    debug!("Wrote version files under {:?}", version_dir);
    Ok(layout.version_id.clone())
}

fn empty_store() -> Value {
    json!({ "profiles": {}, "settings": {}, "version": 3 })
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert or refresh one entry, leaving every other key untouched.
/// Timestamps are only set on creation so an identical re-run is a no-op.
fn upsert_profile(store: &mut Value, layout: &ClientLayout, now: &str) -> Result<(), String> {
    let root = store
        .as_object_mut()
        .ok_or_else(|| "profile store root is not an object".to_string())?;
    let profiles = root
        .entry("profiles")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| "\"profiles\" is not an object".to_string())?;

    let entry = profiles
        .entry(layout.profile_key.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(entry) = entry.as_object_mut() else {
        return Err(format!("profile {} is not an object", layout.profile_key));
    };

    entry
        .entry("created")
        .or_insert_with(|| Value::String(now.to_string()));
    entry.insert("name".into(), Value::String(layout.profile_name.clone()));
    entry.insert("type".into(), Value::String("custom".into()));
    entry
        .entry("lastUsed")
        .or_insert_with(|| Value::String(now.to_string()));
    entry.insert("lastVersionId".into(), Value::String(layout.version_id.clone()));
    entry
        .entry("icon")
        .or_insert_with(|| Value::String(layout.icon.clone()));
    Ok(())
}
