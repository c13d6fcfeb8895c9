//! Migration orchestration: per-file read→rewrite→write with format
//! fallback, and batch traversal over a directory tree.
//!
//! Format detection is a heuristic, so a failed first attempt is retried
//! once under the opposite reader before the file is declared failed. Both
//! attempts are recorded in the result's attempt trail.

use crate::error::{MigrateError, MigrateResult};
use crate::excel::{WorkbookReader, WorkbookWriter};
use crate::report::MigrationReport;
use crate::rewrite::{rewrite_sheet, Annotation, RewriteOutcome};
use crate::scanner::scan_sheet;
use crate::sniff::{safe_detect, WorkbookFormat};
use crate::types::{MigrationResult, SheetData, SheetResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Scan and rewrite without writing any output.
    pub dry_run: bool,
    /// Keep the source file's extension on the output name. The bytes are
    /// always modern .xlsx regardless of the name.
    pub keep_extension: bool,
}

/// Drives the migration of files and directory trees.
pub struct Migrator {
    options: MigrateOptions,
}

impl Migrator {
    pub fn new(options: MigrateOptions) -> Self {
        Self { options }
    }

    /// Migrate every spreadsheet under `input` into a mirrored tree at
    /// `output`. Per-file failures are recorded in the report and the batch
    /// continues; reports are written into `output` unless dry-running.
    pub fn migrate_tree(&self, input: &Path, output: &Path) -> MigrateResult<MigrationReport> {
        if !input.is_dir() {
            return Err(MigrateError::InvalidInput(format!(
                "not a directory: {}",
                input.display()
            )));
        }
        let mut report = MigrationReport::new(input, output);
        let (files, skipped) = collect_excel_files(input);
        report.note_skipped(skipped);
        info!("found {} spreadsheet files under {}", files.len(), input.display());

        if !self.options.dry_run {
            fs::create_dir_all(output)?;
        }

        for (idx, file) in files.iter().enumerate() {
            info!(
                "[{}/{}] processing: {}",
                idx + 1,
                files.len(),
                file.display()
            );
            let rel = file
                .strip_prefix(input)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(file.file_name().unwrap_or_default()));
            let target = self.target_name(output.join(rel));
            let result = self.migrate_file(file, &target);
            if result.success {
                info!(
                    "  migrated: {} ({} directives found, {} converted)",
                    target.display(),
                    result.directives_found,
                    result.directives_converted
                );
            } else {
                error!(
                    "  failed: {} - {}",
                    file.display(),
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            report.record(result);
        }

        if !self.options.dry_run {
            report.write_to(output)?;
        }
        Ok(report)
    }

    /// Migrate one file into `output_dir`, named after the source.
    pub fn migrate_single(
        &self,
        source: &Path,
        output_dir: &Path,
    ) -> MigrateResult<MigrationResult> {
        if !source.is_file() {
            return Err(MigrateError::InvalidInput(format!(
                "not a file: {}",
                source.display()
            )));
        }
        let name = source.file_name().ok_or_else(|| {
            MigrateError::InvalidInput(format!("no file name in {}", source.display()))
        })?;
        let target = self.target_name(output_dir.join(name));
        if target == source {
            return Err(MigrateError::InvalidInput(format!(
                "output would overwrite the input file {}; choose a different output directory",
                source.display()
            )));
        }
        Ok(self.migrate_file(source, &target))
    }

    /// Migrate one file with automatic format fallback. Never returns an
    /// error: failures are carried inside the result so batch callers can
    /// keep going.
    pub fn migrate_file(&self, source: &Path, target: &Path) -> MigrationResult {
        // The trail carries exactly one entry per format attempt; a failure
        // is folded into that attempt's own line rather than appended as a
        // separate one.
        let mut attempts = Vec::new();
        let detected = safe_detect(source);
        info!("  first attempt: using the {} reader", detected);

        let first_error = match self.attempt(source, target, detected) {
            Ok(mut result) => {
                attempts.push(format!("first attempt: detected format {}", detected));
                result.attempts = attempts;
                return result;
            }
            Err(e) => e,
        };
        attempts.push(format!(
            "first attempt: detected format {}, failed: {}",
            detected, first_error
        ));
        warn!("  first attempt failed: {}", first_error);

        let fallback = detected.opposite();
        info!("  second attempt: forcing the {} reader", fallback);
        match self.attempt(source, target, fallback) {
            Ok(mut result) => {
                attempts.push(format!("second attempt: using the {} reader", fallback));
                result.attempts = attempts;
                result
            }
            Err(second_error) => {
                attempts.push(format!(
                    "second attempt: using the {} reader, failed: {}",
                    fallback, second_error
                ));
                error!("  all migration attempts failed");
                error!("    first error: {}", first_error);
                error!("    second error: {}", second_error);
                let mut result = MigrationResult::new(source, target);
                result.error = Some(format!(
                    "all attempts failed: first error={}, second error={}",
                    first_error, second_error
                ));
                result.attempts = attempts;
                result
            }
        }
    }

    /// One full read→rewrite→write pass under a fixed format.
    fn attempt(
        &self,
        source: &Path,
        target: &Path,
        format: WorkbookFormat,
    ) -> MigrateResult<MigrationResult> {
        let mut result = MigrationResult::new(source, target);
        let sheets = WorkbookReader::new(source).read(format)?;

        let mut rewritten: Vec<(SheetData, Vec<Annotation>)> = Vec::with_capacity(sheets.len());
        for sheet in &sheets {
            let directives = scan_sheet(sheet);
            let RewriteOutcome {
                sheet,
                annotations,
                changes,
                directives_found,
                directives_converted,
                rows_deleted,
                ..
            } = rewrite_sheet(sheet, &directives);
            result.sheets.push(SheetResult {
                sheet: sheet.name.clone(),
                directives_found,
                directives_converted,
                rows_deleted,
                annotations_added: annotations.len(),
            });
            result.changes.extend(changes);
            result.directives_found += directives_found;
            result.directives_converted += directives_converted;
            rewritten.push((sheet, annotations));
        }

        if self.options.dry_run {
            debug!("dry run: skipping write of {}", target.display());
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let staging = TempOutput::new(target);
            WorkbookWriter::new(staging.path()).write(&rewritten)?;
            staging.persist()?;
            debug!("saved {}", target.display());
        }

        result.success = true;
        Ok(result)
    }

    /// Map an output path to its final name. Default mode always names the
    /// output `.xlsx`; keep-extension mode leaves the source name untouched.
    fn target_name(&self, mapped: PathBuf) -> PathBuf {
        if self.options.keep_extension {
            mapped
        } else {
            mapped.with_extension("xlsx")
        }
    }
}

/// Staged output file. Content is written to a sibling temp path and moved
/// into place on [`persist`](TempOutput::persist); if the write fails before
/// that, dropping the guard removes the temp file.
struct TempOutput {
    write_path: PathBuf,
    final_path: PathBuf,
    persisted: bool,
}

impl TempOutput {
    fn new(target: &Path) -> Self {
        let is_xlsx = target
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("xlsx"))
            .unwrap_or(false);
        let write_path = if is_xlsx {
            target.to_path_buf()
        } else {
            // Append rather than swap the extension so a sibling source that
            // really is named .xlsx can never be clobbered by the staging file.
            let mut name = target.file_name().unwrap_or_default().to_os_string();
            name.push(".tmp");
            target.with_file_name(name)
        };
        Self {
            write_path,
            final_path: target.to_path_buf(),
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.write_path
    }

    fn persist(mut self) -> MigrateResult<()> {
        if self.write_path != self.final_path {
            if self.final_path.exists() {
                fs::remove_file(&self.final_path)?;
            }
            fs::rename(&self.write_path, &self.final_path)?;
        }
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if !self.persisted && self.write_path != self.final_path && self.write_path.exists() {
            let _ = fs::remove_file(&self.write_path);
        }
    }
}

/// Collect `.xls`/`.xlsx` files under `root`, skipping hidden directories.
/// Lock files (`~$...`) are counted but not returned.
fn collect_excel_files(root: &Path) -> (Vec<PathBuf>, usize) {
    let mut files = Vec::new();
    let mut skipped = 0usize;
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_excel_extension(entry.path()) {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with("~$") {
            debug!("skipping lock file {}", entry.path().display());
            skipped += 1;
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort();
    (files, skipped)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn has_excel_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("xls") || ext.eq_ignore_ascii_case("xlsx")
    )
}
