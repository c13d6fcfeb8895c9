use crate::error::MigrateResult;
use crate::excel::WorkbookReader;
use crate::migrate::{MigrateOptions, Migrator};
use crate::report::{MigrationReport, REPORT_MD};
use crate::scanner::scan_sheet;
use crate::sniff::{self, DetectedFormat};
use crate::types::cell_ref;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Execute the migrate command
pub fn migrate(
    input: PathBuf,
    output: Option<PathBuf>,
    single_file: bool,
    dry_run: bool,
    keep_extension: bool,
    verbose: bool,
) -> MigrateResult<()> {
    println!(
        "{}",
        "🔄 JXLS Migration - 1.x templates → 2.x".bold().green()
    );
    println!("   Input: {}", input.display());
    if keep_extension {
        println!("   Keeping source extensions (bytes are always .xlsx)");
    }
    println!();

    if dry_run {
        println!(
            "{}",
            "📋 DRY RUN MODE - No changes will be written\n".yellow()
        );
    }

    let migrator = Migrator::new(MigrateOptions {
        dry_run,
        keep_extension,
    });

    if single_file || input.is_file() {
        migrate_one(&migrator, &input, output, verbose)
    } else {
        let output_dir = output.unwrap_or_else(|| default_output_dir(&input));
        println!("   Output: {}\n", output_dir.display());
        let report = migrator.migrate_tree(&input, &output_dir)?;
        print_summary(&report, dry_run, &output_dir);
        if report.stats().failed > 0 {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn migrate_one(
    migrator: &Migrator,
    input: &Path,
    output: Option<PathBuf>,
    verbose: bool,
) -> MigrateResult<()> {
    let output_dir = output.unwrap_or_else(|| {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let result = migrator.migrate_single(input, &output_dir)?;

    if verbose {
        for attempt in &result.attempts {
            println!("   {}", attempt.cyan());
        }
        println!();
    }

    if result.success {
        println!(
            "{} {}",
            "✅ Migrated:".bold().green(),
            result.target.display()
        );
        println!(
            "   🔧 {} directives found, 🔄 {} converted",
            result.directives_found, result.directives_converted
        );
        for sheet in &result.sheets {
            println!(
                "   📄 {}: {} found, {} converted, {} rows deleted, {} comments",
                sheet.sheet.bright_blue(),
                sheet.directives_found,
                sheet.directives_converted,
                sheet.rows_deleted,
                sheet.annotations_added
            );
        }
        Ok(())
    } else {
        println!(
            "{} {}",
            "❌ Migration failed:".bold().red(),
            result.error.as_deref().unwrap_or("unknown error")
        );
        for attempt in &result.attempts {
            println!("   {}", attempt);
        }
        std::process::exit(1);
    }
}

/// Execute the scan command - list directives without writing anything
pub fn scan(file: PathBuf) -> MigrateResult<()> {
    println!("{}", "🔍 JXLS Migration - Template scan".bold().green());
    println!("   File: {}\n", file.display());

    let format = sniff::safe_detect(&file);
    let reader = WorkbookReader::new(&file);
    let sheets = match reader.read(format) {
        Ok(sheets) => sheets,
        Err(first) => {
            println!(
                "{}",
                format!(
                    "⚠️  {} reader failed ({}), retrying as {}",
                    format,
                    first,
                    format.opposite()
                )
                .yellow()
            );
            reader.read(format.opposite())?
        }
    };

    let mut total = 0usize;
    for sheet in &sheets {
        let directives = scan_sheet(sheet);
        println!(
            "📄 Sheet {} - {} directive(s)",
            sheet.name.bright_blue().bold(),
            directives.len()
        );
        for found in &directives {
            println!(
                "   {} {}: {}",
                cell_ref(found.location.row, found.location.col).bold(),
                found.directive.name().cyan(),
                found.raw
            );
        }
        total += directives.len();
        println!();
    }

    println!(
        "{}",
        format!("✅ Scan complete: {} directive(s) in {} sheet(s)", total, sheets.len())
            .bold()
            .green()
    );
    Ok(())
}

/// Execute the detect command - print the sniffed container format
pub fn detect(file: PathBuf) -> MigrateResult<()> {
    println!("{}", "🔎 JXLS Migration - Format detection".bold().green());
    println!("   File: {}\n", file.display());

    match sniff::detect(&file) {
        DetectedFormat::Legacy => {
            println!("   Header: OLE2 compound document (legacy .xls)");
        }
        DetectedFormat::Modern => {
            println!("   Header: ZIP container (modern .xlsx)");
        }
        DetectedFormat::Unknown => {
            println!("   Header: {}", "unrecognized".yellow());
        }
    }
    let effective = sniff::safe_detect(&file);
    println!("   Effective format: {}", effective.to_string().bold());
    Ok(())
}

/// Output directory used when none is given: `<input>_migrated` next to the
/// input.
fn default_output_dir(input: &Path) -> PathBuf {
    let mut name = input.file_name().unwrap_or_default().to_os_string();
    name.push("_migrated");
    input.with_file_name(name)
}

fn print_summary(report: &MigrationReport, dry_run: bool, output_dir: &Path) {
    let stats = report.stats();
    println!("{}", "=".repeat(80));
    println!("{}", "Migration complete".bold().green());
    println!("✅ Succeeded: {}", stats.succeeded);
    println!("❌ Failed: {}", stats.failed);
    println!("⏭️  Skipped: {}", stats.skipped);
    println!("📊 Total: {}", stats.total);
    println!("📄 Files processed: {}", stats.processed);
    println!("🔧 Directives found: {}", stats.directives_found);
    println!("🔄 Directives converted: {}", stats.directives_converted);
    println!("🎯 Success rate: {:.2}%", stats.success_rate());
    if !dry_run {
        println!(
            "📄 Report saved to: {}",
            output_dir.join(REPORT_MD).display()
        );
    }
    println!("{}", "=".repeat(80));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_dir_is_sibling() {
        assert_eq!(
            default_output_dir(Path::new("/data/templates")),
            PathBuf::from("/data/templates_migrated")
        );
        assert_eq!(
            default_output_dir(Path::new("templates")),
            PathBuf::from("templates_migrated")
        );
    }
}
