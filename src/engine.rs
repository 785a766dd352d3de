use std::time::{Duration, Instant};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::core::{AggregationResult, ImageFindings, ScanSummary, Severity};
use crate::filter::filter_findings;
use crate::scanner::{ScanError, Scanner};

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub threshold: Severity,
    pub show_progress: bool,
}

/// Scans images one at a time and keeps the findings at the threshold severity.
#[derive(Clone)]
pub struct Engine<S> {
    scanner: S,
    opts: EngineOptions,
}

impl<S: Scanner> Engine<S> {
    pub fn new(scanner: S, opts: EngineOptions) -> Self {
        Self { scanner, opts }
    }

    pub fn threshold(&self) -> Severity {
        self.opts.threshold
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    /// Scans every image in input order.
    ///
    /// A failed scan is logged and the image is left out of the result
    /// (fail-open); it never aborts the remaining images.
    pub fn aggregate<I: AsRef<str>>(&self, images: &[I]) -> AggregationResult {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();

        let mut result = AggregationResult::default();
        for (idx, image) in images.iter().enumerate() {
            let image = image.as_ref();

            let pb = if progress_enabled {
                let pb = indicatif::ProgressBar::new_spinner();
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_message(format!("スキャン中 ({}/{}) {image}", idx + 1, images.len()));
                pb.enable_steady_tick(Duration::from_millis(120));
                Some(pb)
            } else {
                None
            };

            let outcome = self.scan_image(image);

            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match outcome {
                Ok(Some(entry)) => result.record(entry),
                Ok(None) => {}
                Err(err) => {
                    warn!(image, error = %err, "スキャンに失敗したためイメージをスキップします");
                }
            }
        }
        result
    }

    /// Aggregates `images` and wraps the result with its decision and metadata.
    pub fn summarize<I: AsRef<str>>(&self, images: &[I]) -> ScanSummary {
        let result = self.aggregate(images);
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        ScanSummary::new(
            images.iter().map(|i| i.as_ref().to_string()).collect(),
            self.opts.threshold,
            result,
            generated_at,
        )
    }

    /// Scans one image and filters it. `Ok(None)` means no finding reached the threshold.
    pub fn scan_image(&self, image: &str) -> Result<Option<ImageFindings>, ScanError> {
        if image.trim().is_empty() {
            return Err(ScanError::EmptyImage);
        }

        info!(image, "スキャンを実行します");
        let started = Instant::now();
        let report = self.scanner.scan(image)?;
        let findings = filter_findings(&report, self.opts.threshold);

        for f in &findings {
            info!(
                image,
                vulnerability_id = %f.vulnerability_id,
                pkg_name = %f.pkg_name,
                installed_version = %f.installed_version,
                severity = %f.severity,
                description = %f.description,
                "脆弱性を検出しました"
            );
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if findings.is_empty() {
            info!(
                image,
                threshold = %self.opts.threshold,
                elapsed_ms,
                "しきい値に該当する脆弱性はありません"
            );
            return Ok(None);
        }

        info!(
            image,
            threshold = %self.opts.threshold,
            count = findings.len(),
            elapsed_ms,
            "しきい値に該当する脆弱性が見つかりました"
        );
        Ok(Some(ImageFindings {
            image: image.to_string(),
            target: report.artifact_name,
            findings,
        }))
    }
}
