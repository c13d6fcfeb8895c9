//! Batch reporting: aggregates per-file results into run statistics and
//! renders them as Markdown and JSON reports next to the migrated tree.

use crate::error::MigrateResult;
use crate::types::{ChangeKind, MigrationResult};
use chrono::Local;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const REPORT_MD: &str = "migration_report.md";
pub const REPORT_JSON: &str = "migration_report.json";

/// Totals across one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub directives_found: usize,
    pub directives_converted: usize,
}

impl RunStats {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64 * 100.0
        }
    }
}

/// Collects [`MigrationResult`]s over a run and renders the reports.
pub struct MigrationReport {
    input: PathBuf,
    output: PathBuf,
    results: Vec<MigrationResult>,
    skipped: usize,
}

impl MigrationReport {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input: P, output: Q) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            results: Vec::new(),
            skipped: 0,
        }
    }

    pub fn record(&mut self, result: MigrationResult) {
        self.results.push(result);
    }

    /// Count files that were present in the tree but never attempted
    /// (lock files, hidden directories).
    pub fn note_skipped(&mut self, count: usize) {
        self.skipped += count;
    }

    pub fn results(&self) -> &[MigrationResult] {
        &self.results
    }

    pub fn stats(&self) -> RunStats {
        let succeeded = self.results.iter().filter(|r| r.success).count();
        let failed = self.results.len() - succeeded;
        // Directive counts from failed files are partial, so only successful
        // files contribute to the run totals.
        let directives_found = self
            .results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.directives_found)
            .sum();
        let directives_converted = self
            .results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.directives_converted)
            .sum();
        RunStats {
            total: self.results.len() + self.skipped,
            processed: self.results.len(),
            succeeded,
            failed,
            skipped: self.skipped,
            directives_found,
            directives_converted,
        }
    }

    /// Write both report files into `dir`, returning their paths.
    pub fn write_to(&self, dir: &Path) -> MigrateResult<(PathBuf, PathBuf)> {
        let md_path = dir.join(REPORT_MD);
        fs::write(&md_path, self.to_markdown())?;
        info!("wrote Markdown report: {}", md_path.display());

        let json_path = dir.join(REPORT_JSON);
        fs::write(&json_path, self.to_json()?)?;
        info!("wrote JSON report: {}", json_path.display());

        Ok((md_path, json_path))
    }

    pub fn to_json(&self) -> MigrateResult<String> {
        #[derive(Serialize)]
        struct Failure<'a> {
            file: &'a Path,
            error: &'a str,
            attempts: &'a [String],
        }
        #[derive(Serialize)]
        struct JsonReport<'a> {
            timestamp: String,
            input: &'a Path,
            output: &'a Path,
            stats: RunStats,
            results: &'a [MigrationResult],
            failures: Vec<Failure<'a>>,
        }

        let failures = self
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| Failure {
                file: &r.source,
                error: r.error.as_deref().unwrap_or("unknown error"),
                attempts: &r.attempts,
            })
            .collect();
        let report = JsonReport {
            timestamp: Local::now().to_rfc3339(),
            input: &self.input,
            output: &self.output,
            stats: self.stats(),
            results: &self.results,
            failures,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }

    pub fn to_markdown(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();
        let _ = writeln!(out, "# JXLS 1.x → 2.x Template Migration Report\n");
        let _ = writeln!(
            out,
            "**Generated**: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "**Input**: `{}`", self.input.display());
        let _ = writeln!(out, "**Output**: `{}`\n", self.output.display());
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## 📊 Statistics\n");
        let _ = writeln!(out, "- ✅ Succeeded: {}", stats.succeeded);
        let _ = writeln!(out, "- ❌ Failed: {}", stats.failed);
        let _ = writeln!(out, "- ⏭️ Skipped: {}", stats.skipped);
        let _ = writeln!(out, "- 📊 Total: {}", stats.total);
        let _ = writeln!(out, "- 📄 Files processed: {}", stats.processed);
        let _ = writeln!(out, "- 🔧 Directives found: {}", stats.directives_found);
        let _ = writeln!(
            out,
            "- 🔄 Directives converted: {}",
            stats.directives_converted
        );
        let _ = writeln!(out, "- 🎯 Success rate: {:.2}%\n", stats.success_rate());
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## 📄 Files\n");
        if self.results.is_empty() {
            let _ = writeln!(out, "None\n");
        } else {
            let _ = writeln!(out, "| Status | Source | Target | Found | Converted |");
            let _ = writeln!(out, "|--------|--------|--------|-------|-----------|");
            for result in &self.results {
                let _ = writeln!(
                    out,
                    "| {} | `{}` | `{}` | {} | {} |",
                    if result.success { "✅" } else { "❌" },
                    file_name(&result.source),
                    file_name(&result.target),
                    result.directives_found,
                    result.directives_converted
                );
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## ✅ Migrated files\n");
        let successes: Vec<_> = self.results.iter().filter(|r| r.success).collect();
        if successes.is_empty() {
            let _ = writeln!(out, "None\n");
        } else {
            for (idx, result) in successes.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "### {}. `{}` → `{}`\n",
                    idx + 1,
                    file_name(&result.source),
                    file_name(&result.target)
                );
                let _ = writeln!(
                    out,
                    "- **Directives**: found {}, converted {}",
                    result.directives_found, result.directives_converted
                );
                for (kind, count) in changes_by_kind(result) {
                    let _ = writeln!(out, "- **{}**: {} changes", kind.label(), count);
                }
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## ❌ Failed files\n");
        let failures: Vec<_> = self.results.iter().filter(|r| !r.success).collect();
        if failures.is_empty() {
            let _ = writeln!(out, "None\n");
        } else {
            for (idx, result) in failures.iter().enumerate() {
                let _ = writeln!(out, "{}. `{}`", idx + 1, file_name(&result.source));
                let _ = writeln!(
                    out,
                    "   - **Error**: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                if !result.attempts.is_empty() {
                    let _ = writeln!(out, "   - **Attempts**: {}", result.attempts.join("; "));
                }
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## 📝 Migration notes\n");
        let _ = writeln!(out, "### Key changes\n");
        let _ = writeln!(out, "1. **jx:forEach → jx:each**");
        let _ = writeln!(out, "   - the `jx:forEach` and `/jx:forEach` marker rows are removed");
        let _ = writeln!(out, "   - an Excel comment is added on the first data row");
        let _ = writeln!(
            out,
            "   - comment form: `jx:each(items=\"...\" var=\"...\" lastCell=\"...\")`\n"
        );
        let _ = writeln!(out, "2. **jx:if → jx:if**");
        let _ = writeln!(out, "   - the `test` attribute becomes `condition`");
        let _ = writeln!(out, "   - converted to a comment as well\n");
        let _ = writeln!(out, "3. **jx:out → ${{...}}**");
        let _ = writeln!(out, "   - `<jx:out select=\"var\"/>` → `${{var}}`");
        let _ = writeln!(out, "   - `jx:out(select=\"var\")` → `${{var}}`\n");
        let _ = writeln!(out, "4. **jx:area**");
        let _ = writeln!(out, "   - existing area directives are kept");
        let _ = writeln!(out, "   - when none exist, one is synthesized\n");
        let _ = writeln!(out, "5. **jx:multiSheet → jx:multiSheet**");
        let _ = writeln!(out, "   - converted to a comment\n");
        let _ = writeln!(out, "### Preserved content\n");
        let _ = writeln!(out, "- ✅ cell values and formula text");
        let _ = writeln!(out, "- ✅ merged cells (remapped around removed rows)");
        let _ = writeln!(out, "- ✅ sheet names and ordering");
        let _ = writeln!(
            out,
            "- ⚠️ cell styles, column widths, and row heights reset to defaults\n"
        );
        let _ = writeln!(out, "---\n");

        let _ = writeln!(out, "## 🎯 Next steps\n");
        let _ = writeln!(out, "1. Review the failed files listed above");
        let _ = writeln!(out, "2. Validate exports from business-critical templates");
        let _ = writeln!(out, "3. Run the template unit tests");
        let _ = writeln!(out, "4. Update application code to load the new template paths");
        let _ = writeln!(out, "5. Roll the migrated templates out gradually");

        out
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Group a result's change log by directive family, preserving first-seen order.
fn changes_by_kind(result: &MigrationResult) -> Vec<(ChangeKind, usize)> {
    let mut groups: Vec<(ChangeKind, usize)> = Vec::new();
    for change in &result.changes {
        match groups.iter_mut().find(|(kind, _)| *kind == change.kind) {
            Some((_, count)) => *count += 1,
            None => groups.push((change.kind, 1)),
        }
    }
    groups
}
