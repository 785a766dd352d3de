use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Inbound review request describing the containers pending admission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageReview {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub spec: ReviewSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSpec {
    pub containers: Vec<Container>,
    pub annotations: BTreeMap<String, String>,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub image: String,
}

impl ImageReview {
    /// Image references in container order.
    pub fn images(&self) -> Vec<String> {
        self.spec
            .containers
            .iter()
            .map(|c| c.image.clone())
            .collect()
    }
}
