use std::fmt;
use std::path::PathBuf;

use crate::core::error::{InstallerError, InstallerResult};

/// A parsed Maven coordinate as used in loader library lists.
///
/// Supported formats:
///   `groupId:artifactId:version`
///   `groupId:artifactId:version:classifier`
///   either of the above with an `@extension` suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension. Defaults to `"jar"`.
    pub extension: String,
}

impl MavenArtifact {
    pub fn parse(coord: &str) -> InstallerResult<Self> {
        let invalid = || InstallerError::InvalidMavenCoordinate(coord.to_string());

        let (body, extension) = match coord.rsplit_once('@') {
            Some((body, ext)) if !ext.is_empty() => (body, ext),
            Some(_) => return Err(invalid()),
            None => (coord, "jar"),
        };

        let mut parts = body.split(':');
        let group_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let artifact_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let version = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let classifier = parts.next().map(str::to_string);
        if parts.next().is_some() || classifier.as_deref() == Some("") {
            return Err(invalid());
        }

        Ok(Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// `artifactId-version[-classifier].extension`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact_id, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// Repository-relative path with `/` separators.
    pub fn repo_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    /// Full URL of the artifact under `repo_base`.
    pub fn url(&self, repo_base: &str) -> String {
        format!("{}/{}", repo_base.trim_end_matches('/'), self.repo_path())
    }

    /// Location inside a `libraries/` tree, mirroring the repository layout.
    pub fn local_path(&self) -> PathBuf {
        self.repo_path().split('/').collect()
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}
