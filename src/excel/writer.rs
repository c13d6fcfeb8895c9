//! Workbook writing via rust_xlsxwriter.
//!
//! Output is always a modern .xlsx container regardless of what the source
//! was. Annotations produced by the rewrite pass become cell notes with a
//! fixed author, which is where JXLS 2.x expects its directives to live.

use crate::error::{MigrateError, MigrateResult};
use crate::rewrite::Annotation;
use crate::style::{points_from_twips, width_from_units, xf_to_format};
use crate::types::{cell_ref, CellValue, SheetData};
use rust_xlsxwriter::{Format, Formula, Note, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Author recorded on every generated note.
const NOTE_AUTHOR: &str = "JXLS Migration Tool";

/// Materializes rewritten sheets into an .xlsx file.
pub struct WorkbookWriter {
    path: PathBuf,
}

impl WorkbookWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, sheets: &[(SheetData, Vec<Annotation>)]) -> MigrateResult<()> {
        let mut workbook = Workbook::new();
        for (sheet, annotations) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name).map_err(|e| {
                MigrateError::Write(format!("failed to name sheet '{}': {}", sheet.name, e))
            })?;
            write_sheet(worksheet, sheet)?;
            attach_annotations(worksheet, &sheet.name, annotations);
        }
        workbook.save(&self.path).map_err(|e| {
            MigrateError::Write(format!(
                "failed to save workbook {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &SheetData) -> MigrateResult<()> {
    // Merged ranges go in first so the cell writes below land on top of the
    // blanks that merge_range seeds into the covered cells.
    for &(r1, c1, r2, c2) in &sheet.merged_ranges {
        if r1 == r2 && c1 == c2 {
            continue;
        }
        if let Err(e) = worksheet.merge_range(r1, c1 as u16, r2, c2 as u16, "", &Format::new()) {
            debug!(
                "skipping merged range {}:{} on '{}': {}",
                cell_ref(r1, c1),
                cell_ref(r2, c2),
                sheet.name,
                e
            );
        }
    }

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            write_cell(worksheet, sheet, row_idx as u32, col_idx as u16, cell)?;
        }
    }

    for (&col, &raw) in &sheet.col_widths {
        worksheet
            .set_column_width(col as u16, width_from_units(raw))
            .map_err(|e| {
                MigrateError::Write(format!("failed to set column width on '{}': {}", sheet.name, e))
            })?;
    }
    for (&row, &raw) in &sheet.row_heights {
        worksheet
            .set_row_height(row, points_from_twips(raw))
            .map_err(|e| {
                MigrateError::Write(format!("failed to set row height on '{}': {}", sheet.name, e))
            })?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    sheet: &SheetData,
    row: u32,
    col: u16,
    cell: &CellValue,
) -> MigrateResult<()> {
    let at = |e: XlsxError| {
        MigrateError::Write(format!(
            "failed to write cell {}: {}",
            cell_ref(row, col as u32),
            e
        ))
    };
    let format = sheet
        .xf_of(row, col as u32)
        .map(|xf| xf_to_format(&sheet.styles, xf));
    match (cell, format) {
        (CellValue::Empty, Some(f)) => {
            worksheet.write_blank(row, col, &f).map_err(at)?;
        }
        (CellValue::Empty, None) => {}
        (CellValue::Text(s), Some(f)) => {
            worksheet.write_string_with_format(row, col, s, &f).map_err(at)?;
        }
        (CellValue::Text(s), None) => {
            worksheet.write_string(row, col, s).map_err(at)?;
        }
        (CellValue::Number(n), Some(f)) => {
            worksheet.write_number_with_format(row, col, *n, &f).map_err(at)?;
        }
        (CellValue::Number(n), None) => {
            worksheet.write_number(row, col, *n).map_err(at)?;
        }
        (CellValue::Bool(b), Some(f)) => {
            worksheet.write_boolean_with_format(row, col, *b, &f).map_err(at)?;
        }
        (CellValue::Bool(b), None) => {
            worksheet.write_boolean(row, col, *b).map_err(at)?;
        }
        (CellValue::Formula(text), Some(f)) => {
            worksheet
                .write_formula_with_format(row, col, Formula::new(text), &f)
                .map_err(at)?;
        }
        (CellValue::Formula(text), None) => {
            worksheet.write_formula(row, col, Formula::new(text)).map_err(at)?;
        }
    }
    Ok(())
}

/// Attach rewrite annotations as notes. A note that the writer rejects is
/// logged and dropped rather than failing the whole file.
///
/// A cell holds at most one note, so annotations that share a cell are
/// folded into one multi-line note; the downstream comment reader treats
/// each line as a separate directive.
fn attach_annotations(worksheet: &mut Worksheet, sheet_name: &str, annotations: &[Annotation]) {
    for annotation in coalesce(annotations) {
        let note = Note::new(&annotation.text).set_author(NOTE_AUTHOR);
        if let Err(e) = worksheet.insert_note(annotation.row, annotation.col as u16, &note) {
            warn!(
                "failed to attach note at {} on '{}': {}",
                cell_ref(annotation.row, annotation.col),
                sheet_name,
                e
            );
        }
    }
}

/// Merge annotations landing on the same cell, preserving first-seen cell
/// order and joining texts with newlines.
fn coalesce(annotations: &[Annotation]) -> Vec<Annotation> {
    let mut merged: Vec<Annotation> = Vec::new();
    for annotation in annotations {
        match merged
            .iter_mut()
            .find(|a| a.row == annotation.row && a.col == annotation.col)
        {
            Some(existing) => {
                existing.text.push('\n');
                existing.text.push_str(&annotation.text);
            }
            None => merged.push(annotation.clone()),
        }
    }
    merged
}
