use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::{ensure_present, write_atomic};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::{InstallPlan, JavaInvocation, LaunchEntry, PlanOutput, ServerLayout};

/// What a server install left on disk.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServerLayoutDescriptor {
    pub root: PathBuf,
    /// `None` when script generation was turned off.
    pub script: Option<PathBuf>,
    /// Every artifact destination, relative to `root`.
    pub files: Vec<PathBuf>,
    pub setup_marker: Option<PathBuf>,
}

/// Writes the launch script for a dedicated server directory.
#[derive(Debug, Clone, Copy)]
pub struct ServerBootstrapWriter {
    windows: bool,
    generate_script: bool,
}

impl Default for ServerBootstrapWriter {
    fn default() -> Self {
        Self::for_windows(cfg!(windows))
    }
}

impl ServerBootstrapWriter {
    /// Script flavour for a specific platform instead of the host's.
    pub fn for_windows(windows: bool) -> Self {
        Self {
            windows,
            generate_script: true,
        }
    }

    /// Only check the artifacts; leave launching to the operator.
    pub fn without_script(mut self) -> Self {
        self.generate_script = false;
        self
    }

    pub fn script_name(&self, layout: &ServerLayout) -> String {
        let extension = if self.windows { "bat" } else { "sh" };
        format!("{}.{}", layout.script_stem, extension)
    }

    /// Create the directory if needed and write the launch script. Only the
    /// script is written here; artifacts were placed by the fetcher and
    /// nothing else in the directory is touched. Without a script nothing
    /// is written at all.
    pub async fn write_server(&self, plan: &InstallPlan) -> InstallerResult<ServerLayoutDescriptor> {
        let root = plan.root();
        let PlanOutput::Server(layout) = plan.output() else {
            return Err(InstallerError::write_failed(
                root,
                "plan does not describe a server install",
            ));
        };

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| InstallerError::write_failed(root, e))?;
        ensure_present(root, plan.artifacts()).await?;

        let script = if self.generate_script {
            let script_path = root.join(self.script_name(layout));
            let script = self.render(layout);
            write_atomic(&script_path, script.as_bytes()).await?;
            make_executable(&script_path).await?;
            debug!("Launch script:\n{}", script);
            info!("Server launch script written to {:?}", script_path);
            Some(script_path)
        } else {
            info!("Skipping launch script for {:?}", root);
            None
        };

        Ok(ServerLayoutDescriptor {
            root: root.to_path_buf(),
            script,
            files: plan.artifacts().iter().map(|a| a.path.clone()).collect(),
            setup_marker: layout.setup.as_ref().map(|s| s.marker.clone()),
        })
    }

    pub fn render(&self, layout: &ServerLayout) -> String {
        if self.windows {
            render_batch(layout)
        } else {
            render_shell(layout)
        }
    }
}

fn render_shell(layout: &ServerLayout) -> String {
    let mut out = String::from("#!/usr/bin/env sh\nset -e\ncd \"$(dirname \"$0\")\"\n\n");
    if let Some(setup) = &layout.setup {
        let marker = sh_quote(&slash_path(&setup.marker));
        out.push_str(&format!("if [ ! -f {} ]; then\n", marker));
        out.push_str(&format!(
            "  {}\n",
            command_line(&layout.java, &setup.invocation, false, sh_quote)
        ));
        out.push_str(&format!("  touch {}\nfi\n\n", marker));
    }
    out.push_str(&format!(
        "exec {} \"$@\"\n",
        command_line(&layout.java, &layout.launch, false, sh_quote)
    ));
    out
}

fn render_batch(layout: &ServerLayout) -> String {
    let mut out = String::from("@echo off\r\ncd /d \"%~dp0\"\r\n\r\n");
    if let Some(setup) = &layout.setup {
        let marker = bat_quote(&slash_path(&setup.marker).replace('/', "\\"));
        out.push_str(&format!("if not exist {} (\r\n", marker));
        out.push_str(&format!(
            "  {}\r\n",
            command_line(&layout.java, &setup.invocation, true, bat_quote)
        ));
        out.push_str("  if errorlevel 1 exit /b 1\r\n");
        out.push_str(&format!("  type nul > {}\r\n)\r\n\r\n", marker));
    }
    out.push_str(&format!(
        "{} %*\r\n",
        command_line(&layout.java, &layout.launch, true, bat_quote)
    ));
    out
}

fn command_line(
    java: &str,
    invocation: &JavaInvocation,
    windows: bool,
    quote: fn(&str) -> String,
) -> String {
    let mut words = vec![quote(java)];
    words.extend(invocation.jvm_args.iter().map(|a| quote(a)));

    match &invocation.entry {
        LaunchEntry::MainClass {
            main_class,
            classpath,
        } => {
            let separator = if windows { ";" } else { ":" };
            let joined = classpath
                .iter()
                .map(|p| slash_path(p))
                .collect::<Vec<_>>()
                .join(separator);
            words.push("-cp".into());
            words.push(quote(&joined));
            words.push(quote(main_class));
        }
        LaunchEntry::Jar { jar } => {
            words.push("-jar".into());
            words.push(quote(&slash_path(jar)));
        }
        LaunchEntry::ArgFiles { unix, windows: win } => {
            let file = if windows { win } else { unix };
            words.push(quote(&format!("@{}", slash_path(file))));
        }
    }

    words.extend(invocation.program_args.iter().map(|a| quote(a)));
    words.join(" ")
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn is_plain(arg: &str) -> bool {
    !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c))
}

fn sh_quote(arg: &str) -> String {
    if is_plain(arg) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn bat_quote(arg: &str) -> String {
    let escaped = arg.replace('%', "%%");
    if is_plain(arg) && !arg.contains(';') {
        escaped
    } else {
        format!("\"{}\"", escaped.replace('"', "\"\""))
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> InstallerResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| InstallerError::write_failed(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> InstallerResult<()> {
    Ok(())
}
