use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{Decision, ScanSummary};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `imagegate --help` を参照してください"
    );
}

pub fn print_scan_summary(summary: &ScanSummary, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    let _ = write_scan_summary(&mut out, summary, cfg);
}

fn write_scan_summary(out: &mut dyn Write, summary: &ScanSummary, cfg: &UiConfig) -> io::Result<()> {
    let flagged = summary.result.len();
    writeln!(
        out,
        "概要: スキャン対象={}  該当イメージ={}  該当件数={}  しきい値={}",
        summary.scanned.len(),
        flagged,
        summary.result.finding_count(),
        summary.threshold
    )?;

    let rows: Vec<Row<'_>> = summary
        .result
        .images
        .iter()
        .flat_map(|(image, entries)| {
            entries.iter().flat_map(move |entry| {
                entry.findings.iter().map(move |f| Row {
                    image: image.as_str(),
                    id: f.vulnerability_id.as_str(),
                    severity: f.severity.as_str(),
                    pkg: f.pkg_name.as_str(),
                    version: f.installed_version.as_str(),
                })
            })
        })
        .collect();

    if !rows.is_empty() {
        let shown = if cfg.verbose {
            rows.len()
        } else {
            rows.len().min(cfg.max_table_rows.max(1))
        };
        writeln!(out)?;
        if rows.len() > shown {
            writeln!(out, "検出された脆弱性（{shown}件表示 / 全{}件）:", rows.len())?;
        } else {
            writeln!(out, "検出された脆弱性（{shown}件表示）:")?;
        }
        write_findings_table(out, &rows[..shown], cfg.color)?;
    }

    writeln!(out)?;
    writeln!(out, "判定: {}", format_decision(&summary.decision, cfg.color))?;
    if let Some(reason) = summary.decision.reason() {
        writeln!(out, "- {reason}")?;
    }
    Ok(())
}

struct Row<'a> {
    image: &'a str,
    id: &'a str,
    severity: &'a str,
    pkg: &'a str,
    version: &'a str,
}

fn write_findings_table(out: &mut dyn Write, rows: &[Row<'_>], color: bool) -> io::Result<()> {
    let label_image = "イメージ";
    let label_id = "ID";
    let label_sev = "深刻度";
    let label_pkg = "パッケージ";
    let label_ver = "バージョン";

    let image_w = column_width(
        label_image,
        rows.iter().map(|r| visible_width_ansi(&truncate_middle(r.image, 48))),
    );
    let id_w = column_width(label_id, rows.iter().map(|r| visible_width_ansi(r.id)));
    let sev_w = column_width(label_sev, rows.iter().map(|r| visible_width_ansi(r.severity)));
    let pkg_w = column_width(
        label_pkg,
        rows.iter().map(|r| visible_width_ansi(&truncate_middle(r.pkg, 32))),
    );

    writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_end_display(label_image, image_w),
        pad_end_display(label_id, id_w),
        pad_end_display(label_sev, sev_w),
        pad_end_display(label_pkg, pkg_w),
        label_ver
    )?;
    writeln!(
        out,
        "{}  {}  {}  {}  {}",
        "-".repeat(image_w),
        "-".repeat(id_w),
        "-".repeat(sev_w),
        "-".repeat(pkg_w),
        "-".repeat(visible_width_ansi(label_ver))
    )?;

    for row in rows {
        writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_end_display(&truncate_middle(row.image, 48), image_w),
            pad_end_display(row.id, id_w),
            pad_end_display(&format_severity(row.severity, color), sev_w),
            pad_end_display(&truncate_middle(row.pkg, 32), pkg_w),
            row.version
        )?;
    }
    Ok(())
}

fn column_width(label: &str, widths: impl Iterator<Item = usize>) -> usize {
    widths.max().unwrap_or(0).max(visible_width_ansi(label))
}

fn format_severity(severity: &str, color: bool) -> String {
    if !color {
        return severity.to_string();
    }
    let code = match severity {
        "CRITICAL" => "31",
        "HIGH" => "33",
        "MEDIUM" => "36",
        _ => "90",
    };
    format!("\x1b[{code}m{severity}\x1b[0m")
}

fn format_decision(decision: &Decision, color: bool) -> String {
    let (label, code) = if decision.is_allowed() {
        ("許可", "32")
    } else {
        ("拒否", "31")
    };
    if color {
        format!("\x1b[{code}m{label}\x1b[0m")
    } else {
        label.to_string()
    }
}

fn truncate_middle(s: &str, max_chars: usize) -> String {
    let len = s.chars().count();
    if len <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let left = keep / 2;
    let right = keep.saturating_sub(left);

    let prefix: String = s.chars().take(left).collect();
    let suffix: String = s.chars().skip(len.saturating_sub(right)).collect();

    format!("{prefix}...{suffix}")
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            let _ = chars.next();
            for ch2 in chars.by_ref() {
                if ch2 == 'm' {
                    break;
                }
            }
            continue;
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}
