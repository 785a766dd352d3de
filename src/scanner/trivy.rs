use std::time::Duration;

use tracing::debug;

use crate::core::ScanReport;
use crate::platform::{self, CommandError};
use crate::scanner::{ScanError, Scanner};

#[derive(Debug, Clone)]
pub struct TrivyOptions {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl Default for TrivyOptions {
    fn default() -> Self {
        Self {
            command: "trivy".to_string(),
            args: default_args(),
            timeout: Duration::from_secs(300),
        }
    }
}

pub fn default_args() -> Vec<String> {
    ["image", "--format", "json", "--quiet"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Invokes the `trivy` CLI (or a compatible command) once per image.
#[derive(Debug, Clone, Default)]
pub struct TrivyScanner {
    opts: TrivyOptions,
}

impl TrivyScanner {
    pub fn new(opts: TrivyOptions) -> Self {
        Self { opts }
    }

    fn command_args<'a>(&'a self, image: &'a str) -> Vec<&'a str> {
        let mut args: Vec<&str> = self.opts.args.iter().map(String::as_str).collect();
        args.push(image);
        args
    }
}

impl Scanner for TrivyScanner {
    fn scan(&self, image: &str) -> Result<ScanReport, ScanError> {
        if image.trim().is_empty() {
            return Err(ScanError::EmptyImage);
        }

        let args = self.command_args(image);
        debug!(command = %self.opts.command, ?args, "スキャナを起動します");

        let output = platform::run_command(&self.opts.command, &args, self.opts.timeout)
            .map_err(|err| command_error(image, err))?;

        if !output.success() {
            return Err(ScanError::exit(image, output.exit_code, &output.stderr));
        }

        parse_report(image, &output.stdout)
    }
}

fn command_error(image: &str, err: CommandError) -> ScanError {
    let image = image.to_string();
    match err {
        CommandError::Spawn { source, .. } => ScanError::Launch { image, source },
        CommandError::Timeout { timeout, .. } => ScanError::Timeout { image, timeout },
        CommandError::Io(source) => ScanError::Io { image, source },
    }
}

pub(crate) fn parse_report(image: &str, stdout: &str) -> Result<ScanReport, ScanError> {
    serde_json::from_str(stdout).map_err(|source| ScanError::Parse {
        image: image.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_args_append_image_last() {
        let scanner = TrivyScanner::default();
        assert_eq!(
            scanner.command_args("nginx:1.0"),
            vec!["image", "--format", "json", "--quiet", "nginx:1.0"]
        );
    }

    #[test]
    fn parse_report_rejects_non_json_output() {
        let err = parse_report("nginx:1.0", "FATAL: unable to initialize").expect_err("parse");
        assert!(matches!(err, ScanError::Parse { .. }));
    }

    #[test]
    fn empty_image_is_rejected_before_launch() {
        let scanner = TrivyScanner::new(TrivyOptions {
            command: "imagegate-definitely-missing-binary".to_string(),
            ..TrivyOptions::default()
        });
        assert!(matches!(scanner.scan("  "), Err(ScanError::EmptyImage)));
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let scanner = TrivyScanner::new(TrivyOptions {
            command: "imagegate-definitely-missing-binary".to_string(),
            ..TrivyOptions::default()
        });
        assert!(matches!(
            scanner.scan("nginx:1.0"),
            Err(ScanError::Launch { .. })
        ));
    }

    #[test]
    fn failures_after_start_are_not_reported_as_launch_errors() {
        let err = command_error(
            "nginx:1.0",
            CommandError::Io(anyhow::anyhow!("broken pipe")),
        );
        assert!(matches!(err, ScanError::Io { .. }), "err={err:?}");
        assert!(!err.to_string().contains("実行できません"));

        let err = command_error(
            "nginx:1.0",
            CommandError::Timeout {
                cmd: "trivy".to_string(),
                timeout: Duration::from_secs(1),
            },
        );
        assert!(matches!(err, ScanError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_exit_error() {
        let scanner = TrivyScanner::new(TrivyOptions {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 1".to_string()],
            timeout: Duration::from_secs(10),
        });
        let err = scanner.scan("nginx:1.0").expect_err("exit");
        let ScanError::Exit { code, stderr, .. } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(code, 1);
        assert_eq!(stderr, "boom");
    }

    #[cfg(unix)]
    #[test]
    fn successful_run_is_parsed() {
        let scanner = TrivyScanner::new(TrivyOptions {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '{"ArtifactName":"%s","Results":[]}' "$0""#.to_string(),
            ],
            timeout: Duration::from_secs(10),
        });
        let report = scanner.scan("redis:6").expect("scan");
        assert_eq!(report.artifact_name, "redis:6");
    }
}
