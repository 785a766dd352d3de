use anyhow::Result;

use crate::core::{AggregationResult, Decision};

/// Renders the admission verdict for an aggregation result.
///
/// Reasons are listed in lexicographic image order regardless of the order
/// scans completed in.
pub fn render(result: &AggregationResult) -> Decision {
    if result.is_empty() {
        return Decision::allowed();
    }

    let mut images: Vec<&str> = result.image_refs().collect();
    images.sort_unstable();

    let reason = images
        .iter()
        .map(|image| format!("image {image} has vulnerabilities"))
        .collect::<Vec<_>>()
        .join(", ");
    Decision::denied(reason)
}

/// Two-space indented JSON document, without a trailing newline.
pub fn to_json(decision: &Decision) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(decision)?)
}

pub fn render_json(result: &AggregationResult) -> Result<Vec<u8>> {
    to_json(&render(result))
}
