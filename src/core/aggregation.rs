use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::Finding;

/// Filtered per-image view: findings that passed the severity threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFindings {
    #[serde(skip)]
    pub image: String,
    #[serde(rename = "Target")]
    pub target: String,
    #[serde(rename = "Vulnerabilities")]
    pub findings: Vec<Finding>,
}

/// Image reference -> findings entries, ordered by image reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    pub images: BTreeMap<String, Vec<ImageFindings>>,
}

impl AggregationResult {
    /// Entries without findings are dropped so an image key always has at least one finding.
    pub fn record(&mut self, entry: ImageFindings) {
        if entry.findings.is_empty() {
            return;
        }
        self.images
            .entry(entry.image.clone())
            .or_default()
            .push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn contains(&self, image: &str) -> bool {
        self.images.contains_key(image)
    }

    /// Image references in lexicographic order.
    pub fn image_refs(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn finding_count(&self) -> usize {
        self.images
            .values()
            .flatten()
            .map(|entry| entry.findings.len())
            .sum()
    }
}
