use crate::core::{Finding, ScanReport, Severity};

/// Findings whose severity is exactly `threshold`, in report order.
///
/// Groups are walked in report order and findings in group order. Any other
/// severity string (including differently cased or unknown values) is dropped.
pub fn filter_findings(report: &ScanReport, threshold: Severity) -> Vec<Finding> {
    report
        .findings()
        .filter(|f| threshold.matches(&f.severity))
        .cloned()
        .collect()
}
