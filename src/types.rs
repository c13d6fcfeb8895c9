use crate::style::StyleTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

//==============================================================================
// Cell Coordinates
//==============================================================================

/// Zero-based position of a single cell within a named sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLocation {
    pub row: u32,
    pub col: u32,
    pub sheet: String,
}

impl CellLocation {
    pub fn new(row: u32, col: u32, sheet: impl Into<String>) -> Self {
        Self {
            row,
            col,
            sheet: sheet.into(),
        }
    }
}

/// Convert a zero-based column index to its letter form (0 -> A, 26 -> AA).
pub fn column_letter(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col as i64;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        n = n / 26 - 1;
        if n < 0 {
            break;
        }
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Render a zero-based (row, col) pair as an A1-style reference.
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

/// Decompose an A1-style reference into zero-based (row, col). `None` for
/// anything that is not plain letters-then-digits.
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim();
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col: u32 = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let row: u32 = digits.parse().ok().filter(|&r| r > 0)?;
    Some((row - 1, col - 1))
}

//==============================================================================
// Cell Values
//==============================================================================

/// In-memory cell payload carried from the reader to the writer.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Formula(String),
}

impl CellValue {
    /// Text content, when the cell holds a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// A cell counts as populated when it carries anything beyond
    /// whitespace. Numbers and booleans are always populated, zero included.
    pub fn is_populated(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Text(s) => !s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => true,
            CellValue::Formula(f) => !f.trim().is_empty(),
        }
    }
}

//==============================================================================
// Sheet Model
//==============================================================================

/// One sheet's grid plus the formatting side-channels the writer re-applies.
///
/// Style information is best-effort: `cell_styles` indexes into `styles`, and
/// both may be empty when the source format exposes nothing.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
    /// Per-cell format (XF) index, parallel to `rows`. Absent entries mean
    /// unstyled.
    pub cell_styles: Vec<Vec<Option<u32>>>,
    /// Shared style tables the per-cell indices point into.
    pub styles: StyleTable,
    /// Merged regions as (first_row, first_col, last_row, last_col), inclusive.
    pub merged_ranges: Vec<(u32, u32, u32, u32)>,
    /// Column widths in legacy 1/256-character units.
    pub col_widths: BTreeMap<u32, f64>,
    /// Row heights in twips.
    pub row_heights: BTreeMap<u32, f64>,
}

impl SheetData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Width of the widest row.
    pub fn col_count(&self) -> u32 {
        self.rows.iter().map(|r| r.len() as u32).max().unwrap_or(0)
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.rows.get(row as usize)?.get(col as usize)
    }

    /// Cell-format index of a cell, when the reader recorded one.
    pub fn xf_of(&self, row: u32, col: u32) -> Option<u32> {
        *self.cell_styles.get(row as usize)?.get(col as usize)?
    }

    /// Leftmost populated column of a row, if any cell qualifies.
    pub fn leftmost_populated_col(&self, row: u32) -> Option<u32> {
        let cells = self.rows.get(row as usize)?;
        cells
            .iter()
            .position(|c| c.is_populated())
            .map(|i| i as u32)
    }

    /// Rightmost populated column of a row, if any cell qualifies.
    pub fn rightmost_populated_col(&self, row: u32) -> Option<u32> {
        let cells = self.rows.get(row as usize)?;
        cells
            .iter()
            .rposition(|c| c.is_populated())
            .map(|i| i as u32)
    }
}

//==============================================================================
// Change Log
//==============================================================================

/// Directive family a rewrite action belongs to. Serialized names follow the
/// template vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    #[serde(rename = "area")]
    Area,
    #[serde(rename = "each")]
    Each,
    #[serde(rename = "if")]
    Conditional,
    #[serde(rename = "out")]
    Output,
    #[serde(rename = "multiSheet")]
    MultiSheet,
}

impl ChangeKind {
    /// Label used in reports, matching the serialized name.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Area => "area",
            ChangeKind::Each => "each",
            ChangeKind::Conditional => "if",
            ChangeKind::Output => "out",
            ChangeKind::MultiSheet => "multiSheet",
        }
    }
}

/// One recorded rewrite action. Rows are 1-based for presentation; the log is
/// reporting-only and never drives control flow.
#[derive(Debug, Clone, Serialize)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub row: u32,
    pub description: String,
}

impl PendingChange {
    pub fn new(kind: ChangeKind, row: u32, description: impl Into<String>) -> Self {
        Self {
            kind,
            row,
            description: description.into(),
        }
    }
}

//==============================================================================
// Results
//==============================================================================

/// Per-sheet breakdown inside a [`MigrationResult`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SheetResult {
    pub sheet: String,
    pub directives_found: usize,
    pub directives_converted: usize,
    pub rows_deleted: usize,
    pub annotations_added: usize,
}

/// Aggregate outcome of migrating one file. Created fresh per file and never
/// mutated after it is returned.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub source: PathBuf,
    pub target: PathBuf,
    pub success: bool,
    pub sheets: Vec<SheetResult>,
    pub changes: Vec<PendingChange>,
    pub directives_found: usize,
    pub directives_converted: usize,
    pub error: Option<String>,
    /// One entry per format attempt, in order.
    pub attempts: Vec<String>,
}

impl MigrationResult {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            success: false,
            sheets: Vec::new(),
            changes: Vec::new(),
            directives_found: 0,
            directives_converted: 0,
            error: None,
            attempts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_cell_ref_is_one_based() {
        assert_eq!(cell_ref(0, 0), "A1");
        assert_eq!(cell_ref(9, 3), "D10");
    }

    #[test]
    fn test_parse_cell_ref_round_trips() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("D10"), Some((9, 3)));
        assert_eq!(parse_cell_ref("aa7"), Some((6, 26)));
        assert_eq!(parse_cell_ref(" B3 "), Some((2, 1)));
    }

    #[test]
    fn test_parse_cell_ref_rejects_garbage() {
        assert_eq!(parse_cell_ref(""), None);
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(parse_cell_ref("B"), None);
        assert_eq!(parse_cell_ref("B0"), None);
        assert_eq!(parse_cell_ref("$B$3"), None);
    }

    #[test]
    fn test_populated_rules() {
        assert!(!CellValue::Empty.is_populated());
        assert!(!CellValue::Text("   ".to_string()).is_populated());
        assert!(CellValue::Text("x".to_string()).is_populated());
        assert!(CellValue::Number(0.0).is_populated());
        assert!(CellValue::Bool(false).is_populated());
    }

    #[test]
    fn test_populated_column_scans() {
        let sheet = SheetData::from_rows(
            "S",
            vec![vec![
                CellValue::Empty,
                CellValue::Text("a".to_string()),
                CellValue::Number(1.0),
                CellValue::Empty,
            ]],
        );
        assert_eq!(sheet.leftmost_populated_col(0), Some(1));
        assert_eq!(sheet.rightmost_populated_col(0), Some(2));
        assert_eq!(sheet.leftmost_populated_col(5), None);
    }

    #[test]
    fn test_xf_of_handles_missing_tables() {
        let sheet = SheetData::from_rows("S", vec![vec![CellValue::Empty]]);
        assert!(sheet.xf_of(0, 0).is_none());

        let mut styled = SheetData::from_rows("S", vec![vec![CellValue::Empty]]);
        styled.cell_styles = vec![vec![Some(4)]];
        assert_eq!(styled.xf_of(0, 0), Some(4));
        assert_eq!(styled.xf_of(0, 9), None);
    }
}
