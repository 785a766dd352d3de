use serde::{Deserialize, Deserializer, Serialize};

use crate::core::Finding;

/// Raw scanner output for a single image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanReport {
    #[serde(
        rename = "SchemaVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_version: Option<u32>,
    #[serde(rename = "ArtifactName", default)]
    pub artifact_name: String,
    #[serde(rename = "Results", default, deserialize_with = "null_as_empty")]
    pub results: Vec<ResultGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultGroup {
    #[serde(rename = "Target", default)]
    pub target: String,
    #[serde(rename = "Class", default)]
    pub class: String,
    #[serde(rename = "Type", default)]
    pub result_type: String,
    #[serde(rename = "Vulnerabilities", default, deserialize_with = "null_as_empty")]
    pub vulnerabilities: Vec<Finding>,
}

impl ScanReport {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.results.iter().flat_map(|r| r.vulnerabilities.iter())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
