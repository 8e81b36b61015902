//! CLI output formatting for every asset family.
//!
//! # Output Format
//!
//! ## Run
//!
//! ```text
//! ==> images: src/images → dist/images
//! 4 items, 4 workers
//! team/a.png [raster]
//!     a.avif (12.4 KB)
//!     a.webp (30.1 KB)
//!     a.png (28.0 KB)
//! b.xyz [copy]
//!     b.xyz (120 B)
//! icons/c.svg [svg] FAILED: SVG optimization failed: ...
//!     fallback: c.svg (2.1 KB)
//! logo.png [raster] up to date
//! images: 4 items (1 transformed, 1 copied), 1 skipped, 1 failed (1 fallback copy), 72.7 KB written
//!     icons/c.svg: SVG optimization failed: ...
//! ```
//!
//! ## Check
//!
//! ```text
//! images: src/images → dist/images
//!     raster: 12
//!     svg: 3
//!     copy: 1
//! favicons: src/images/favicons → dist/favicons
//!     favicons: 2
//!     missing: src/images/favicons/dark/logo.svg
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::dispatch::{Outcome, TransformResult};
use crate::family::Survey;
use crate::pipeline::{BatchReport, PipelineEvent};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

// ============================================================================
// Run output
// ============================================================================

pub fn format_stage_header(family: &str, source: &Path, output: &Path) -> String {
    format!(
        "==> {}: {} \u{2192} {}",
        family,
        source.display(),
        output.display()
    )
}

/// Lines for one transformed item.
pub fn format_result(result: &TransformResult) -> Vec<String> {
    let head = format!("{} [{}]", result.relative.display(), result.transform);
    match &result.outcome {
        Outcome::Written(written) => {
            let mut lines = vec![head];
            lines.extend(
                written
                    .iter()
                    .map(|w| format!("    {} ({})", file_name(&w.path), format_size(w.bytes))),
            );
            lines
        }
        Outcome::Skipped(_) => vec![format!("{} up to date", head)],
        Outcome::Failed { error, fallback } => {
            let mut lines = vec![format!("{} FAILED: {}", head, error)];
            if let Some(w) = fallback {
                lines.push(format!(
                    "    fallback: {} ({})",
                    file_name(&w.path),
                    format_size(w.bytes)
                ));
            }
            lines
        }
    }
}

/// Format a single progress event as display lines.
pub fn format_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::Started { items, workers, .. } => {
            vec![format!("{}, {}", plural(*items, "item"), plural(*workers, "worker"))]
        }
        PipelineEvent::Item(result) => format_result(result),
    }
}

/// The final line for one family, followed by every failure.
pub fn format_summary(report: &BatchReport) -> Vec<String> {
    let s = report.summary();
    let mut line = format!(
        "{}: {} ({} transformed, {} copied), {} skipped, {} failed",
        report.family,
        plural(s.total(), "item"),
        s.transformed,
        s.copied,
        s.skipped,
        s.failed
    );
    if s.fallbacks > 0 {
        let copies = if s.fallbacks == 1 { "copy" } else { "copies" };
        line.push_str(&format!(" ({} fallback {})", s.fallbacks, copies));
    }
    line.push_str(&format!(", {} written", format_size(s.bytes_written)));

    let mut lines = vec![line];
    for failure in report.failures() {
        if let Outcome::Failed { error, .. } = &failure.outcome {
            lines.push(format!("    {}: {}", failure.relative.display(), error));
        }
    }
    lines
}

pub fn print_stage_header(family: &str, source: &Path, output: &Path) {
    println!("{}", format_stage_header(family, source, output));
}

pub fn print_summary(report: &BatchReport) {
    for line in format_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

pub fn format_check(survey: &Survey) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} \u{2192} {}",
        survey.family,
        survey.source_root.display(),
        survey.output_root.display()
    )];
    if survey.by_transform.is_empty() && survey.missing.is_empty() {
        lines.push("    (no inputs)".to_string());
    }
    for (transform, count) in &survey.by_transform {
        lines.push(format!("    {}: {}", transform, count));
    }
    for path in &survey.missing {
        lines.push(format!("    missing: {}", path.display()));
    }
    lines
}

pub fn print_check(survey: &Survey) {
    for line in format_check(survey) {
        println!("{}", line);
    }
}
