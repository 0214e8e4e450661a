//! Self-contained HTML rendering of a report

use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Local};

use super::aggregator::{LogLevel, ReportEntry, ReportMeta, Summary, TestStatus};

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2em; color: #222; background: #fafafa; }
h1 { margin-bottom: 0; }
.name { color: #666; margin-top: 0.2em; }
table.system td { padding: 2px 12px 2px 0; }
.summary span { display: inline-block; margin-right: 1.5em; font-weight: bold; }
.entry { background: #fff; border: 1px solid #ddd; border-left: 6px solid #999; margin: 1em 0; padding: 0.6em 1em; }
.entry.passed { border-left-color: #2e7d32; }
.entry.failed { border-left-color: #c62828; }
.entry.skipped { border-left-color: #f9a825; }
.status { font-weight: bold; margin-right: 0.6em; }
.logs { font-family: monospace; font-size: 0.9em; margin: 0.5em 0; }
.logs .fail { color: #c62828; }
.logs .pass { color: #2e7d32; }
.logs .warning, .logs .skip { color: #b26a00; }
pre.trace { background: #f4f4f4; padding: 0.6em; overflow-x: auto; }
img.shot { max-width: 640px; border: 1px solid #ccc; }
"#;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Absolute file URL when the file exists, the path as written otherwise
fn link(path: &Path) -> String {
    match std::fs::canonicalize(path) {
        Ok(abs) => format!("file://{}", abs.display()),
        Err(_) => path.display().to_string(),
    }
}

fn status_class(status: Option<TestStatus>) -> &'static str {
    match status {
        Some(TestStatus::Passed) => "passed",
        Some(TestStatus::Failed) => "failed",
        Some(TestStatus::Skipped) => "skipped",
        None => "running",
    }
}

fn level_class(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "info",
        LogLevel::Pass => "pass",
        LogLevel::Fail => "fail",
        LogLevel::Skip => "skip",
        LogLevel::Warning => "warning",
    }
}

fn render_entry(out: &mut String, entry: &ReportEntry) {
    let status = entry
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "UNFINISHED".to_string());
    let _ = writeln!(out, r#"<div class="entry {}">"#, status_class(entry.status));
    let _ = write!(
        out,
        r#"<h3><span class="status">{}</span>{}"#,
        status,
        escape(&entry.test_id)
    );
    if entry.attempt > 1 {
        let _ = write!(out, " (attempt {})", entry.attempt);
    }
    let _ = writeln!(out, "</h3>");
    if !entry.description.is_empty() {
        let _ = writeln!(out, "<p>{}</p>", escape(&entry.description));
    }

    let duration = entry
        .finished
        .map(|end| format!(" &middot; {:.1}s", (end - entry.started).num_milliseconds() as f64 / 1000.0))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        r#"<p class="name">Started {}{}</p>"#,
        entry.started.format("%Y-%m-%d %H:%M:%S"),
        duration
    );

    let _ = writeln!(out, r#"<div class="logs">"#);
    for line in &entry.logs {
        let _ = writeln!(
            out,
            r#"<div class="{}">{} [{}] {}</div>"#,
            level_class(line.level),
            line.timestamp.format("%H:%M:%S"),
            line.level.label(),
            escape(&line.message)
        );
    }
    let _ = writeln!(out, "</div>");

    if let Some(failure) = &entry.failure {
        let _ = writeln!(out, r#"<pre class="trace">{}</pre>"#, escape(&failure.trace));
    }
    for path in &entry.attachments {
        let href = escape(&link(path));
        if path.extension().is_some_and(|e| e == "png") {
            let _ = writeln!(
                out,
                r#"<p><a href="{0}"><img class="shot" src="{0}" alt="screenshot"></a></p>"#,
                href
            );
        } else {
            let _ = writeln!(out, r#"<p><a href="{0}">{0}</a></p>"#, href);
        }
    }
    let _ = writeln!(out, "</div>");
}

pub(super) fn render(
    meta: &ReportMeta,
    entries: &[ReportEntry],
    summary: &Summary,
    generated: DateTime<Local>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, r#"<html lang="en"><head><meta charset="utf-8">"#);
    let _ = writeln!(out, "<title>{}</title>", escape(&meta.title));
    let _ = writeln!(out, "<style>{}</style></head><body>", STYLE);
    let _ = writeln!(out, "<h1>{}</h1>", escape(&meta.title));
    let _ = writeln!(out, r#"<p class="name">{}</p>"#, escape(&meta.name));

    let system = &meta.system;
    let _ = writeln!(out, r#"<table class="system">"#);
    for (key, value) in [
        ("OS", &system.os),
        ("Architecture", &system.arch),
        ("Harness", &system.harness),
        ("Browser", &system.browser),
        ("Environment", &system.environment),
        ("Application URL", &system.application_url),
    ] {
        let _ = writeln!(out, "<tr><td>{}</td><td>{}</td></tr>", key, escape(value));
    }
    let _ = writeln!(
        out,
        "<tr><td>Generated</td><td>{}</td></tr></table>",
        generated.format("%Y-%m-%d %H:%M:%S")
    );

    let _ = writeln!(
        out,
        r#"<p class="summary"><span>Total: {}</span><span style="color:#2e7d32">Passed: {}</span><span style="color:#c62828">Failed: {}</span><span style="color:#b26a00">Skipped: {}</span></p>"#,
        summary.total, summary.passed, summary.failed, summary.skipped
    );

    for entry in entries {
        render_entry(&mut out, entry);
    }

    let _ = writeln!(out, "</body></html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
