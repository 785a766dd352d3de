use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity levels as reported by the scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// Exact, case-sensitive match against a raw severity string from a report.
    pub fn matches(self, raw: &str) -> bool {
        raw == self.as_str()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            "UNKNOWN" => Ok(Severity::Unknown),
            _ => Err(format!(
                "深刻度が不正です: {s}（CRITICAL|HIGH|MEDIUM|LOW|UNKNOWN を指定してください）"
            )),
        }
    }
}
