use serde::{Deserialize, Serialize};

/// One vulnerability record as emitted by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    #[serde(rename = "VulnerabilityID")]
    pub vulnerability_id: String,
    #[serde(rename = "PkgName")]
    pub pkg_name: String,
    #[serde(rename = "InstalledVersion")]
    pub installed_version: String,
    #[serde(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Description")]
    pub description: String,
}
