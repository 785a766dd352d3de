use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::Severity;
use crate::scanner::TrivyOptions;

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub scanner: ScannerConfig,
    pub policy: PolicyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyConfig {
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub listen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        let trivy = TrivyOptions::default();
        Self {
            scanner: ScannerConfig {
                command: trivy.command,
                args: trivy.args,
                timeout_secs: trivy.timeout.as_secs(),
            },
            policy: PolicyConfig {
                severity: Severity::Critical,
            },
            server: ServerConfig {
                listen: "0.0.0.0:8080".to_string(),
                tls_cert: None,
                tls_key: None,
            },
            logging: LoggingConfig { json: false },
            config_path: None,
        }
    }
}

impl EffectiveConfig {
    pub fn trivy_options(&self) -> TrivyOptions {
        TrivyOptions {
            command: self.scanner.command.clone(),
            args: self.scanner.args.clone(),
            timeout: Duration::from_secs(self.scanner.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    scanner: Option<RawScannerConfig>,
    policy: Option<RawPolicyConfig>,
    server: Option<RawServerConfig>,
    logging: Option<RawLoggingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScannerConfig {
    command: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicyConfig {
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServerConfig {
    listen: Option<String>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoggingConfig {
    json: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/imagegate/config.toml")
}

/// Defaults, then the TOML file (if present), then `IMAGEGATE_*` variables.
pub fn load(config_path: Option<&Path>, home_dir: Option<&Path>) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| home_dir.map(default_config_path));

    if let Some(path) = path {
        if config_path.is_some() || path.exists() {
            let s = std::fs::read_to_string(&path).with_context(|| {
                format!("設定ファイルの読み取りに失敗しました: {}", path.display())
            })?;
            let raw: RawConfig =
                toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
            apply_raw_config(&mut cfg, raw)?;
            cfg.config_path = Some(path.display().to_string());
        }
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) -> Result<()> {
    if let Some(scanner) = raw.scanner {
        if let Some(command) = scanner.command {
            cfg.scanner.command = command;
        }
        if let Some(args) = scanner.args {
            cfg.scanner.args = args;
        }
        if let Some(timeout_secs) = scanner.timeout_secs {
            cfg.scanner.timeout_secs = timeout_secs;
        }
    }

    if let Some(policy) = raw.policy {
        if let Some(severity) = policy.severity {
            cfg.policy.severity = severity
                .parse::<Severity>()
                .map_err(anyhow::Error::msg)
                .context("policy.severity")?;
        }
    }

    if let Some(server) = raw.server {
        if let Some(listen) = server.listen {
            cfg.server.listen = listen;
        }
        if let Some(tls_cert) = server.tls_cert {
            cfg.server.tls_cert = Some(tls_cert);
        }
        if let Some(tls_key) = server.tls_key {
            cfg.server.tls_key = Some(tls_key);
        }
    }

    if let Some(logging) = raw.logging {
        if let Some(json) = logging.json {
            cfg.logging.json = json;
        }
    }

    Ok(())
}

fn apply_env_overrides(
    cfg: &mut EffectiveConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = var("IMAGEGATE_SCANNER_COMMAND") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.scanner.command = v.to_string();
        }
    }
    if let Some(v) = var("IMAGEGATE_SCANNER_ARGS") {
        let parts: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            cfg.scanner.args = parts;
        }
    }
    if let Some(v) = var("IMAGEGATE_SCANNER_TIMEOUT_SECS") {
        cfg.scanner.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "IMAGEGATE_SCANNER_TIMEOUT_SECS")?;
    }
    if let Some(v) = var("IMAGEGATE_POLICY_SEVERITY") {
        cfg.policy.severity = v
            .parse::<Severity>()
            .map_err(anyhow::Error::msg)
            .with_context(|| "IMAGEGATE_POLICY_SEVERITY")?;
    }
    if let Some(v) = var("IMAGEGATE_SERVER_LISTEN") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.server.listen = v.to_string();
        }
    }
    if let Some(v) = var("IMAGEGATE_SERVER_TLS_CERT") {
        cfg.server.tls_cert = non_empty_path(&v);
    }
    if let Some(v) = var("IMAGEGATE_SERVER_TLS_KEY") {
        cfg.server.tls_key = non_empty_path(&v);
    }
    if let Some(v) = var("IMAGEGATE_LOG_JSON") {
        cfg.logging.json = parse_bool(&v).with_context(|| "IMAGEGATE_LOG_JSON")?;
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.scanner.command.trim().is_empty() {
        anyhow::bail!("scanner.command は空にできません");
    }
    if cfg.scanner.timeout_secs == 0 {
        anyhow::bail!("scanner.timeout_secs は 0 より大きい必要があります");
    }
    if cfg.server.tls_cert.is_some() != cfg.server.tls_key.is_some() {
        anyhow::bail!("server.tls_cert と server.tls_key は両方指定してください");
    }
    Ok(())
}

fn non_empty_path(s: &str) -> Option<PathBuf> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    }
}

pub(crate) fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}
