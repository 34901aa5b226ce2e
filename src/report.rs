//! Text and JSON rendering of audit results.
//!
//! Text output is streamed: [`TextRenderer`] writes each line as its control
//! finishes. JSON output needs the whole run and goes through
//! [`AuditReport`].

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{section_title, BENCHMARK};
use crate::runner::{ControlResult, Summary};
use crate::types::VerdictKind;

/// Render one control as its report lines.
///
/// The first line is `<VERDICT>: <id> <title>`. Non-passing controls add
/// the reason and remediation; manual controls add their audit target.
pub fn control_lines(result: &ControlResult) -> String {
    let mut out = format!("{}: {} {}\n", result.verdict.kind(), result.id, result.title);
    if result.verdict.kind() == VerdictKind::Pass {
        return out;
    }
    if let Some(reason) = result.verdict.reason() {
        out.push_str(&format!("    reason: {reason}\n"));
    }
    if let Some(target) = &result.audit_target {
        out.push_str(&format!("    audit: {}\n", target.display()));
    }
    if !result.remediation.is_empty() {
        out.push_str(&format!("    remediation: {}\n", result.remediation));
    }
    out
}

/// `== Summary: P PASS, F FAIL, W WARN, I INFO, E ERROR ==`
pub fn summary_line(summary: &Summary) -> String {
    format!(
        "== Summary: {} PASS, {} FAIL, {} WARN, {} INFO, {} ERROR ==",
        summary.pass, summary.fail, summary.warn, summary.info, summary.error
    )
}

/// Streaming text renderer. Prints a section header whenever the section
/// changes, then the control's lines.
pub struct TextRenderer<W: Write> {
    out: W,
    section: Option<&'static str>,
    summary: Summary,
}

impl<W: Write> TextRenderer<W> {
    /// Renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            section: None,
            summary: Summary::default(),
        }
    }

    /// Write one result.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn render(&mut self, result: &ControlResult) -> io::Result<()> {
        let section = result.section_id();
        if self.section != Some(section) {
            if self.section.is_some() {
                writeln!(self.out)?;
            }
            match section_title(section) {
                Some(title) => writeln!(self.out, "[{section}] {title}")?,
                None => writeln!(self.out, "[{section}]")?,
            }
            self.section = Some(section);
        }
        self.summary.record(&result.verdict);
        self.out.write_all(control_lines(result).as_bytes())?;
        self.out.flush()
    }

    /// Write the summary line and return the counts.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn finish(mut self) -> io::Result<Summary> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", summary_line(&self.summary))?;
        self.out.flush()?;
        Ok(self.summary)
    }
}

/// A complete run, ordered by catalog position.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Benchmark name and revision.
    pub benchmark: &'static str,
    /// When the report was assembled.
    pub generated_at: DateTime<Utc>,
    /// Results in catalog order.
    pub results: Vec<ControlResult>,
    /// Verdict counts.
    pub summary: Summary,
}

impl AuditReport {
    /// Assemble a report from results arriving in any order.
    pub fn collect(mut results: Vec<ControlResult>) -> Self {
        results.sort_by_key(|r| r.position);
        let summary = Summary::of(&results);
        Self {
            benchmark: BENCHMARK,
            generated_at: Utc::now(),
            results,
            summary,
        }
    }

    /// `true` when any automated control failed.
    pub fn has_automated_failure(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.automated && r.verdict.kind() == VerdictKind::Fail)
    }

    /// Full text rendering (headers, control lines, summary).
    pub fn to_text(&self) -> String {
        let mut buf = Vec::new();
        let mut renderer = TextRenderer::new(&mut buf);
        for result in &self.results {
            // Writing to a Vec cannot fail.
            let _ = renderer.render(result);
        }
        let _ = renderer.finish();
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
