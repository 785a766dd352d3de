use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::config::EffectiveConfig;
use crate::core::{Decision, Severity};
use crate::engine::{Engine, EngineOptions};
use crate::handler::{HandlerError, ReviewHandler};
use crate::logs::LogOptions;
use crate::scanner::TrivyScanner;
use crate::server::{ServeOptions, TlsPaths};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "imagegate",
    version,
    about = "コンテナイメージの脆弱性をスキャンし、ImageReview のアドミッション判定を返す"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Per-image scanner timeout in seconds (overrides scanner.timeout_secs).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Review(ReviewArgs),
    Scan(ScanArgs),
    Serve(ServeArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// ImageReview document; `-` reads stdin.
    pub file: PathBuf,
    #[arg(long)]
    pub fail_on_deny: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[arg(required = true)]
    pub images: Vec<String>,
    #[arg(long)]
    pub severity: Option<Severity>,
    #[arg(long)]
    pub fail_on_deny: bool,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub listen: Option<String>,
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = std::env::var_os("HOME").map(PathBuf::from);
    let env_config_path = std::env::var_os("IMAGEGATE_CONFIG").map(PathBuf::from);
    let mut cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        home_dir.as_deref(),
    )
    .map_err(crate::exit::invalid_args_err)?;

    if let Some(timeout) = cli.timeout {
        if timeout == 0 {
            return Err(crate::exit::invalid_args(
                "--timeout は 0 より大きい必要があります",
            ));
        }
        cfg.scanner.timeout_secs = timeout;
    }

    crate::logs::init(LogOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
        json: cfg.logging.json,
        color: stderr_is_tty && !cli.no_color,
    });

    let ui_cfg = UiConfig {
        color: stdout_is_tty && !cli.no_color,
        max_table_rows: 50,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Review(args) => {
            let body = read_review_input(&args.file).map_err(crate::exit::invalid_args_err)?;
            let handler = review_handler(&cfg, cfg.policy.severity, stderr_is_tty && !cli.quiet);
            let decision = match handler.handle(&body) {
                Ok(decision) => decision,
                Err(err @ HandlerError::Malformed(_)) => {
                    return Err(crate::exit::invalid_args_err(
                        anyhow::Error::new(err)
                            .context(format!("レビュー要求を解析できません: {}", args.file.display())),
                    ));
                }
            };
            write_decision(&decision)?;
            deny_exit(&decision, args.fail_on_deny)?;
        }
        Commands::Scan(args) => {
            let threshold = args.severity.unwrap_or(cfg.policy.severity);
            let engine = Engine::new(
                TrivyScanner::new(cfg.trivy_options()),
                EngineOptions {
                    threshold,
                    show_progress: stderr_is_tty && !cli.quiet && !cli.json,
                },
            );
            let summary = engine.summarize(&args.images);
            if cli.json {
                write_json(&summary)?;
            } else {
                crate::ui::print_scan_summary(&summary, &ui_cfg);
            }
            deny_exit(&summary.decision, args.fail_on_deny)?;
        }
        Commands::Serve(args) => {
            let listen = args.listen.unwrap_or_else(|| cfg.server.listen.clone());
            let tls = match (args.tls_cert, args.tls_key) {
                (Some(cert), Some(key)) => Some(TlsPaths { cert, key }),
                _ => match (cfg.server.tls_cert.clone(), cfg.server.tls_key.clone()) {
                    (Some(cert), Some(key)) => Some(TlsPaths { cert, key }),
                    _ => None,
                },
            };
            let handler = Arc::new(review_handler(&cfg, cfg.policy.severity, false));

            info!(
                scanner = %cfg.scanner.command,
                threshold = %cfg.policy.severity,
                "webhook を起動します"
            );
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("非同期ランタイムの初期化に失敗しました")?;
            runtime
                .block_on(crate::server::serve(handler, ServeOptions { listen, tls }))
                .map_err(crate::exit::external_cmd_err)?;
        }
        Commands::Config(args) => {
            if args.show {
                write_config(&cfg, cli.json)?;
            } else if !ui_cfg.quiet {
                eprintln!("config: `imagegate config --show` を使用してください");
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "imagegate", &mut out);
        }
    }

    Ok(())
}

fn review_handler(
    cfg: &EffectiveConfig,
    threshold: Severity,
    show_progress: bool,
) -> ReviewHandler<TrivyScanner> {
    ReviewHandler::new(Engine::new(
        TrivyScanner::new(cfg.trivy_options()),
        EngineOptions {
            threshold,
            show_progress,
        },
    ))
}

fn read_review_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("標準入力の読み取りに失敗しました")?;
        return Ok(buf);
    }
    let buf = std::fs::read(path)
        .with_context(|| format!("ファイルの読み取りに失敗しました: {}", path.display()))?;
    info!(path = %path.display(), "レビュー要求を読み込みました");
    Ok(buf)
}

fn deny_exit(decision: &Decision, fail_on_deny: bool) -> Result<()> {
    if fail_on_deny && !decision.is_allowed() {
        return Err(crate::exit::denied(
            decision.reason().unwrap_or("denied").to_string(),
        ));
    }
    Ok(())
}

fn write_decision(decision: &Decision) -> Result<()> {
    let mut buf = crate::decision::to_json(decision)?;
    buf.push(b'\n');
    write_stdout(&buf)
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut buf = serde_json::to_vec_pretty(value)?;
    buf.push(b'\n');
    write_stdout(&buf)
}

fn write_config(cfg: &EffectiveConfig, json: bool) -> Result<()> {
    if json {
        return write_json(cfg);
    }
    let text = toml::to_string_pretty(cfg)?;
    write_stdout(text.as_bytes())
}

fn write_stdout(buf: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(buf).and_then(|()| stdout.flush()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}
