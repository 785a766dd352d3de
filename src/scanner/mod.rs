//! Scanner boundary: one image reference in, one structured report out.
//!
//! The engine only depends on the [`Scanner`] trait, so tests and alternative
//! backends can stand in for the external `trivy` binary.

use std::time::Duration;

use crate::core::ScanReport;

mod trivy;

pub use trivy::{TrivyOptions, TrivyScanner};

const MAX_STDERR_CHARS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("イメージ参照が空です")]
    EmptyImage,
    #[error("スキャナを起動できませんでした: {image}")]
    Launch {
        image: String,
        #[source]
        source: std::io::Error,
    },
    #[error("スキャナの実行中にエラーが発生しました: {image}")]
    Io {
        image: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("スキャンがタイムアウトしました（{timeout:?}）: {image}")]
    Timeout { image: String, timeout: Duration },
    #[error("スキャナが失敗しました（exit_code={code}）: {image}{}", stderr_suffix(.stderr))]
    Exit {
        image: String,
        code: i32,
        stderr: String,
    },
    #[error("スキャナの出力を解析できませんでした: {image}")]
    Parse {
        image: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ScanError {
    pub fn exit(image: &str, code: i32, stderr: &str) -> Self {
        ScanError::Exit {
            image: image.to_string(),
            code,
            stderr: truncate_chars(stderr.trim(), MAX_STDERR_CHARS),
        }
    }
}

/// Produces a vulnerability report for a single image.
pub trait Scanner {
    fn scan(&self, image: &str) -> Result<ScanReport, ScanError>;
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{stderr}")
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars).collect();
    format!("{head}…")
}
