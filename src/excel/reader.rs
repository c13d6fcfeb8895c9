//! Workbook reading via calamine.
//!
//! Both the legacy binary format and the modern zip format load through the
//! same generic path, and both carry their merged-region metadata over.
//! Cell styles, column widths, and row heights are not surfaced by calamine,
//! so sheets load with empty style tables and the writer falls back to
//! defaults.

use crate::error::{MigrateError, MigrateResult};
use crate::sniff::WorkbookFormat;
use crate::types::{CellValue, SheetData};
use calamine::{open_workbook, Data, Dimensions, Range, Reader, Xls, Xlsx};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads every sheet of a workbook into [`SheetData`] grids.
pub struct WorkbookReader {
    path: PathBuf,
}

impl WorkbookReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the workbook as the given format.
    ///
    /// The format is trusted as-is: callers that guessed wrong get a read
    /// error back and can retry with the opposite format.
    pub fn read(&self, format: WorkbookFormat) -> MigrateResult<Vec<SheetData>> {
        match format {
            WorkbookFormat::Legacy => {
                let mut workbook: Xls<_> = open_workbook(&self.path).map_err(|e| {
                    MigrateError::Read(format!("failed to open legacy workbook: {}", e))
                })?;
                let mut sheets = read_sheets(&mut workbook)?;
                for sheet in &mut sheets {
                    if let Some(merges) = workbook.worksheet_merge_cells(&sheet.name) {
                        sheet.merged_ranges = merged_ranges_from_dimensions(&merges);
                    }
                }
                Ok(sheets)
            }
            WorkbookFormat::Modern => {
                let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(|e| {
                    MigrateError::Read(format!("failed to open modern workbook: {}", e))
                })?;
                if let Err(e) = workbook.load_merged_regions() {
                    debug!("no merged-region metadata available: {}", e);
                }
                let mut sheets = read_sheets(&mut workbook)?;
                for sheet in &mut sheets {
                    sheet.merged_ranges = merged_ranges_from_dimensions(
                        workbook
                            .merged_regions_by_sheet(&sheet.name)
                            .iter()
                            .map(|(_, _, dims)| *dims),
                    );
                }
                Ok(sheets)
            }
        }
    }
}

fn read_sheets<R>(workbook: &mut R) -> MigrateResult<Vec<SheetData>>
where
    R: Reader<BufReader<File>>,
    R::Error: std::fmt::Display,
{
    let mut sheets = Vec::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
            MigrateError::Read(format!("failed to read sheet '{}': {}", sheet_name, e))
        })?;
        let formulas = workbook.worksheet_formula(&sheet_name).ok();
        let sheet = build_sheet(&sheet_name, &range, formulas.as_ref());
        debug!(
            "loaded sheet '{}': {} rows x {} cols",
            sheet.name,
            sheet.row_count(),
            sheet.col_count()
        );
        sheets.push(sheet);
    }
    Ok(sheets)
}

/// Convert a calamine range into an absolute-coordinate grid.
///
/// calamine ranges start at the first used cell, not at A1; the grid is
/// padded so that row and column indices line up with real sheet positions.
fn build_sheet(name: &str, range: &Range<Data>, formulas: Option<&Range<String>>) -> SheetData {
    let mut sheet = SheetData::new(name);
    if let Some((start_row, start_col)) = range.start() {
        let (height, width) = range.get_size();
        let total_rows = start_row as usize + height;
        let total_cols = start_col as usize + width;
        let mut rows = vec![vec![CellValue::Empty; total_cols]; total_rows];
        for (r, row) in range.rows().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                rows[start_row as usize + r][start_col as usize + c] = convert_cell(cell);
            }
        }
        sheet.rows = rows;
    }

    // Formula text wins over the cached value, matching what template
    // authors see in the formula bar. used_cells yields coordinates relative
    // to the formula range's own start, so they are shifted back to absolute
    // positions the same way the value grid is.
    if let Some(formulas) = formulas {
        if let Some((start_row, start_col)) = formulas.start() {
            for (row, col, formula) in formulas.used_cells() {
                if formula.trim().is_empty() {
                    continue;
                }
                let row = start_row as usize + row;
                let col = start_col as usize + col;
                if sheet.rows.len() <= row {
                    sheet.rows.resize_with(row + 1, Vec::new);
                }
                if sheet.rows[row].len() <= col {
                    sheet.rows[row].resize(col + 1, CellValue::Empty);
                }
                sheet.rows[row][col] = CellValue::Formula(formula.clone());
            }
        }
    }

    sheet
}

/// Flatten calamine merge metadata into inclusive
/// (first_row, first_col, last_row, last_col) tuples.
fn merged_ranges_from_dimensions<'a>(
    dims: impl IntoIterator<Item = &'a Dimensions>,
) -> Vec<(u32, u32, u32, u32)> {
    dims.into_iter()
        .map(|d| (d.start.0, d.start.1, d.end.0, d.end.1))
        .collect()
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;
    use tempfile::TempDir;

    fn write_fixture(path: &Path) {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Data").unwrap();
        worksheet.write_string(0, 0, "jx:forEach items=\"${rows}\" var=\"r\"").unwrap();
        worksheet.write_string(1, 0, "${r.name}").unwrap();
        worksheet.write_number(1, 1, 42.0).unwrap();
        worksheet.write_boolean(1, 2, true).unwrap();
        worksheet.write_string(2, 0, "</jx:forEach>").unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_read_modern_workbook_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixture.xlsx");
        write_fixture(&path);

        let sheets = WorkbookReader::new(&path)
            .read(WorkbookFormat::Modern)
            .unwrap();
        assert_eq!(sheets.len(), 1);
        let sheet = &sheets[0];
        assert_eq!(sheet.name, "Data");
        assert_eq!(
            sheet.cell(0, 0).and_then(|c| c.as_str()),
            Some("jx:forEach items=\"${rows}\" var=\"r\"")
        );
        assert_eq!(sheet.cell(1, 1), Some(&CellValue::Number(42.0)));
        assert_eq!(sheet.cell(1, 2), Some(&CellValue::Bool(true)));
    }

    #[test]
    fn test_read_pads_to_absolute_coordinates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offset.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        // First used cell is C3; the loaded grid must still index it as (2, 2).
        worksheet.write_string(2, 2, "hello").unwrap();
        workbook.save(&path).unwrap();

        let sheets = WorkbookReader::new(&path)
            .read(WorkbookFormat::Modern)
            .unwrap();
        let sheet = &sheets[0];
        assert_eq!(sheet.cell(0, 0), Some(&CellValue::Empty));
        assert_eq!(sheet.cell(2, 2).and_then(|c| c.as_str()), Some("hello"));
    }

    #[test]
    fn test_read_formula_text_wins_over_cached_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("formula.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .write_formula(0, 0, rust_xlsxwriter::Formula::new("SUM(B1:B3)"))
            .unwrap();
        workbook.save(&path).unwrap();

        let sheets = WorkbookReader::new(&path)
            .read(WorkbookFormat::Modern)
            .unwrap();
        match sheets[0].cell(0, 0) {
            Some(CellValue::Formula(f)) => assert!(f.contains("SUM"), "got formula {:?}", f),
            other => panic!("expected formula cell, got {:?}", other),
        }
    }

    #[test]
    fn test_read_formula_off_origin_stays_at_absolute_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("formula_offset.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        // The formula range starts at C5, not A1; the overlay must not let
        // its relative coordinates land on (and clobber) the anchor cell.
        worksheet.write_string(0, 0, "anchor").unwrap();
        worksheet
            .write_formula(4, 2, rust_xlsxwriter::Formula::new("1+2"))
            .unwrap();
        workbook.save(&path).unwrap();

        let sheets = WorkbookReader::new(&path)
            .read(WorkbookFormat::Modern)
            .unwrap();
        let sheet = &sheets[0];
        assert_eq!(sheet.cell(0, 0).and_then(|c| c.as_str()), Some("anchor"));
        match sheet.cell(4, 2) {
            Some(CellValue::Formula(f)) => assert!(f.contains("1+2"), "got formula {:?}", f),
            other => panic!("expected formula at C5, got {:?}", other),
        }
    }

    #[test]
    fn test_merged_ranges_from_dimensions_keeps_inclusive_bounds() {
        let dims = vec![
            Dimensions {
                start: (0, 0),
                end: (0, 2),
            },
            Dimensions {
                start: (3, 1),
                end: (5, 1),
            },
        ];
        assert_eq!(
            merged_ranges_from_dimensions(&dims),
            vec![(0, 0, 0, 2), (3, 1, 5, 1)]
        );
    }

    #[test]
    fn test_read_merged_regions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merged.xlsx");
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet
            .merge_range(0, 0, 0, 2, "header", &rust_xlsxwriter::Format::new())
            .unwrap();
        worksheet.write_string(1, 0, "body").unwrap();
        workbook.save(&path).unwrap();

        let sheets = WorkbookReader::new(&path)
            .read(WorkbookFormat::Modern)
            .unwrap();
        assert_eq!(sheets[0].merged_ranges, vec![(0, 0, 0, 2)]);
    }

    #[test]
    fn test_read_wrong_format_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixture.xlsx");
        write_fixture(&path);

        let result = WorkbookReader::new(&path).read(WorkbookFormat::Legacy);
        assert!(result.is_err());
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let result = WorkbookReader::new("/nonexistent/missing.xlsx").read(WorkbookFormat::Modern);
        match result {
            Err(MigrateError::Read(msg)) => assert!(msg.contains("failed to open")),
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
