use serde::Deserialize;

use crate::core::error::InstallerResult;

/// `maven-metadata.xml` as published next to every artifact directory.
#[derive(Debug, Deserialize)]
pub struct MavenMetadata {
    pub versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
pub struct MavenVersioning {
    pub versions: MavenVersions,
}

#[derive(Debug, Deserialize)]
pub struct MavenVersions {
    #[serde(rename = "version", default)]
    pub version: Vec<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> InstallerResult<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn versions(&self) -> &[String] {
        &self.versioning.versions.version
    }
}
