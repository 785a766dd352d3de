use serde::{Deserialize, Serialize};

use crate::core::{AggregationResult, Decision, Severity};

pub const SCHEMA_VERSION: &str = "1.0";

/// Output document of `imagegate scan --json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub threshold: Severity,
    pub scanned: Vec<String>,
    #[serde(flatten)]
    pub result: AggregationResult,
    pub decision: Decision,
}

impl ScanSummary {
    pub fn new(
        scanned: Vec<String>,
        threshold: Severity,
        result: AggregationResult,
        generated_at: String,
    ) -> Self {
        let decision = crate::decision::render(&result);
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at,
            threshold,
            scanned,
            result,
            decision,
        }
    }
}
