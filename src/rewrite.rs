//! Rewrite engine: the positional transform from a scanned sheet to its
//! migrated counterpart.
//!
//! Block directives delete their delimiter rows, so every coordinate that
//! survives has to be re-derived. The engine threads an explicit deletion
//! set and row map through the pass instead of mutating shared state, which
//! keeps the adjustment arithmetic testable on its own.

use crate::directive::{substitute_inline_out, AreaDirective, Directive, FoundDirective};
use crate::types::{cell_ref, parse_cell_ref, CellValue, ChangeKind, PendingChange, SheetData};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// A rewritten directive queued for attachment as a cell comment. Positions
/// are post-deletion coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub row: u32,
    pub col: u32,
    pub text: String,
}

/// Everything one sheet's rewrite produced.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub sheet: SheetData,
    pub annotations: Vec<Annotation>,
    pub changes: Vec<PendingChange>,
    pub directives_found: usize,
    pub directives_converted: usize,
    pub rows_deleted: usize,
    /// Original row index to rewritten row index, deleted rows absent.
    pub row_map: BTreeMap<u32, u32>,
}

/// First row after `start_row` whose text contains `closing`,
/// case-insensitive.
fn find_closing_row(sheet: &SheetData, start_row: u32, closing: &str) -> Option<u32> {
    let needle = closing.to_lowercase();
    ((start_row + 1)..sheet.row_count()).find(|&row| {
        sheet.rows[row as usize].iter().any(|cell| {
            cell.as_str()
                .is_some_and(|s| s.to_lowercase().contains(&needle))
        })
    })
}

/// Rows already marked for deletion strictly above `row`; the running
/// subtraction that turns original coordinates into post-deletion ones.
fn adjusted_row(row: u32, deleted: &BTreeSet<u32>) -> u32 {
    row - deleted.range(..row).count() as u32
}

/// Rewrite one sheet given the directives the scanner located in it.
///
/// Directives are consumed in scan order. Block directives are resolved
/// first with a cumulative deletion set; Area directives are finalized after
/// the whole deletion set is known, so both their anchor and their
/// `lastCell` bound reflect every removed row. Inline output directives are
/// substituted during the copy pass.
pub fn rewrite_sheet(source: &SheetData, directives: &[FoundDirective]) -> RewriteOutcome {
    let mut rows_to_delete: BTreeSet<u32> = BTreeSet::new();
    let mut annotations: Vec<Annotation> = Vec::new();
    let mut changes: Vec<PendingChange> = Vec::new();
    let mut converted = 0usize;
    let mut areas: Vec<&FoundDirective> = Vec::new();

    // Pass 1: block and single-row directives, in scan order.
    for found in directives {
        let loc = &found.location;
        match &found.directive {
            Directive::Each(_) | Directive::Conditional(_) => {
                let (closing, kind, action) = match &found.directive {
                    Directive::Each(_) => ("/jx:forEach", ChangeKind::Each, "deleted forEach tag rows"),
                    _ => ("/jx:if", ChangeKind::Conditional, "deleted if tag rows"),
                };
                let Some(end_row) = find_closing_row(source, loc.row, closing) else {
                    warn!(
                        "no closing {} found for directive at row {} in sheet '{}'; skipped",
                        closing,
                        loc.row + 1,
                        loc.sheet
                    );
                    continue;
                };

                rows_to_delete.insert(loc.row);
                rows_to_delete.insert(end_row);

                let data_row = loc.row + 1;
                let adjusted = adjusted_row(data_row, &rows_to_delete);
                let last_col = source
                    .rightmost_populated_col(data_row)
                    .unwrap_or(loc.col);
                let last_cell = cell_ref(adjusted, last_col);
                let anchor_col = source
                    .leftmost_populated_col(data_row)
                    .unwrap_or(loc.col);

                let text = match &found.directive {
                    Directive::Each(d) => d.render(&last_cell),
                    Directive::Conditional(d) => d.render(&last_cell),
                    _ => unreachable!(),
                };

                debug!("{} at row {}, added comment: {}", action, loc.row + 1, text);
                changes.push(PendingChange::new(
                    kind,
                    loc.row + 1,
                    format!(
                        "{}, added comment: {} (at {})",
                        action,
                        text,
                        cell_ref(adjusted, anchor_col)
                    ),
                ));
                annotations.push(Annotation {
                    row: adjusted,
                    col: anchor_col,
                    text,
                });
                converted += 1;
            }
            Directive::MultiSheet(d) => {
                let text = d.render();
                rows_to_delete.insert(loc.row);
                // Anchored at the original location, matching the historical
                // behavior of this conversion.
                annotations.push(Annotation {
                    row: loc.row,
                    col: loc.col,
                    text: text.clone(),
                });
                changes.push(PendingChange::new(
                    ChangeKind::MultiSheet,
                    loc.row + 1,
                    format!("converted multiSheet, added comment: {}", text),
                ));
                converted += 1;
            }
            Directive::Area(_) => areas.push(found),
            // Inline substitution during the copy pass handles these.
            Directive::Output(_) => {}
        }
    }

    // Pass 2: areas, now that the deletion set is complete. Area rows are
    // never deleted; both the anchor and the lastCell bound shift by the
    // rows removed above them.
    for found in &areas {
        let Directive::Area(area) = &found.directive else {
            continue;
        };
        let anchor = adjusted_row(found.location.row, &rows_to_delete);
        let adjusted_bound = area
            .last_cell
            .as_deref()
            .and_then(parse_cell_ref)
            .map(|(row, col)| cell_ref(adjusted_row(row, &rows_to_delete), col));
        let text = area.render(adjusted_bound.as_deref());

        debug!("kept area directive at row {}: {}", found.location.row + 1, text);
        changes.push(PendingChange::new(
            ChangeKind::Area,
            found.location.row + 1,
            format!("kept area directive: {}", text),
        ));
        annotations.push(Annotation {
            row: anchor,
            col: found.location.col,
            text,
        });
        converted += 1;
    }

    // Copy pass: drop deleted rows, substitute inline output directives,
    // build the row map.
    let mut row_map: BTreeMap<u32, u32> = BTreeMap::new();
    let mut new_rows: Vec<Vec<CellValue>> = Vec::new();
    let mut new_cell_styles: Vec<Vec<Option<u32>>> = Vec::new();

    for (row_idx, row) in source.rows.iter().enumerate() {
        let row_idx = row_idx as u32;
        if rows_to_delete.contains(&row_idx) {
            continue;
        }
        row_map.insert(row_idx, new_rows.len() as u32);

        let mut copied = Vec::with_capacity(row.len());
        for (col_idx, cell) in row.iter().enumerate() {
            match cell.as_str() {
                Some(text) => {
                    let (rewritten, n) = substitute_inline_out(text);
                    if n > 0 {
                        converted += n;
                        changes.push(PendingChange::new(
                            ChangeKind::Output,
                            row_idx + 1,
                            format!(
                                "converted out directive to expression at {}: {}",
                                cell_ref(row_idx, col_idx as u32),
                                rewritten
                            ),
                        ));
                        copied.push(CellValue::Text(rewritten));
                    } else {
                        copied.push(cell.clone());
                    }
                }
                None => copied.push(cell.clone()),
            }
        }
        new_rows.push(copied);

        if let Some(style_row) = source.cell_styles.get(row_idx as usize) {
            new_cell_styles.push(style_row.clone());
        }
    }

    // Synthesize a default area when none was declared and the sheet
    // actually changed shape. It covers the full populated extent of the
    // kept rows and anchors at the top-left corner; should a block comment
    // already claim that cell, the writer folds both into one note.
    if areas.is_empty() && (!rows_to_delete.is_empty() || !annotations.is_empty()) {
        let kept = new_rows.len() as u32;
        let rightmost = new_rows
            .iter()
            .filter_map(|row| {
                row.iter()
                    .rposition(|cell| cell.is_populated())
                    .map(|i| i as u32)
            })
            .max();
        if let (true, Some(last_col)) = (kept > 0, rightmost) {
            let text = AreaDirective::default().render(Some(&cell_ref(kept - 1, last_col)));
            debug!("synthesized default area: {}", text);
            changes.push(PendingChange::new(
                ChangeKind::Area,
                1,
                format!("synthesized area directive: {}", text),
            ));
            annotations.push(Annotation {
                row: 0,
                col: 0,
                text,
            });
            converted += 1;
        }
    }

    // Merged ranges: drop anything overlapping a deleted row, translate the
    // rest.
    let mut merged_ranges = Vec::new();
    for &(r1, c1, r2, c2) in &source.merged_ranges {
        if (r1..=r2).any(|r| rows_to_delete.contains(&r)) {
            debug!(
                "dropping merged range rows {}-{} overlapping a deleted row",
                r1 + 1,
                r2 + 1
            );
            continue;
        }
        if let (Some(&nr1), Some(&nr2)) = (row_map.get(&r1), row_map.get(&r2)) {
            merged_ranges.push((nr1, c1, nr2, c2));
        }
    }

    // Row heights follow their rows; column widths are unaffected by row
    // deletion.
    let row_heights = source
        .row_heights
        .iter()
        .filter_map(|(row, &h)| row_map.get(row).map(|&new_row| (new_row, h)))
        .collect();

    let sheet = SheetData {
        name: source.name.clone(),
        rows: new_rows,
        cell_styles: new_cell_styles,
        styles: source.styles.clone(),
        merged_ranges,
        col_widths: source.col_widths.clone(),
        row_heights,
    };

    RewriteOutcome {
        sheet,
        annotations,
        changes,
        directives_found: directives.len(),
        directives_converted: converted,
        rows_deleted: rows_to_delete.len(),
        row_map,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_sheet;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn rewrite(sheet: &SheetData) -> RewriteOutcome {
        let directives = scan_sheet(sheet);
        rewrite_sheet(sheet, &directives)
    }

    #[test]
    fn test_identity_when_no_directives() {
        let sheet = SheetData::from_rows(
            "Plain",
            vec![
                vec![text("Name"), text("Price")],
                vec![text("Widget"), CellValue::Number(9.5)],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.sheet.rows, sheet.rows);
        assert_eq!(outcome.directives_found, 0);
        assert_eq!(outcome.directives_converted, 0);
        assert_eq!(outcome.rows_deleted, 0);
        assert!(outcome.annotations.is_empty());
    }

    #[test]
    fn test_for_each_block_rewrite() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${list}" var="item">"#)],
                vec![text("${item.name}"), text("${item.price}")],
                vec![text("/jx:forEach")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.rows_deleted, 2);
        assert_eq!(outcome.sheet.rows.len(), 1);
        assert_eq!(outcome.sheet.rows[0][0], text("${item.name}"));

        // Block comment lands on the shifted data row, then the synthesized
        // area joins it.
        assert_eq!(outcome.annotations.len(), 2);
        assert_eq!(outcome.annotations[0].row, 0);
        assert_eq!(outcome.annotations[0].col, 0);
        assert_eq!(
            outcome.annotations[0].text,
            r#"jx:each(items="list" var="item" lastCell="B1")"#
        );
        assert_eq!(outcome.annotations[1].row, 0);
        assert_eq!(outcome.annotations[1].col, 0);
        assert_eq!(outcome.annotations[1].text, r#"jx:area(lastCell="B1")"#);

        assert_eq!(outcome.directives_found, 1);
        assert_eq!(outcome.directives_converted, 2);
    }

    #[test]
    fn test_trailing_area_adjusts_bound_and_anchor() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${list}" var="item">"#)],
                vec![text("${item.name}"), text("${item.price}")],
                vec![text("/jx:forEach")],
                vec![text(r#"jx:area(lastCell="B3")"#)],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.sheet.rows.len(), 2);
        assert_eq!(
            outcome.annotations[0].text,
            r#"jx:each(items="list" var="item" lastCell="B1")"#
        );
        assert_eq!((outcome.annotations[0].row, outcome.annotations[0].col), (0, 0));

        // The declared bound pointed two rows down; one deleted row sits
        // above it, so both the anchor row and the bound shift by one.
        assert_eq!(outcome.annotations[1].text, r#"jx:area(lastCell="B2")"#);
        assert_eq!((outcome.annotations[1].row, outcome.annotations[1].col), (1, 0));

        // No synthesis when an area was declared.
        assert_eq!(outcome.annotations.len(), 2);
        assert_eq!(outcome.directives_converted, 2);
    }

    #[test]
    fn test_leading_area_keeps_top_anchor() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:area lastCell="B4">"#)],
                vec![text(r#"<jx:forEach items="${rows}" var="r">"#)],
                vec![text("${r.name}"), text("${r.total}")],
                vec![text("/jx:forEach")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.sheet.rows.len(), 2);
        let area = outcome
            .annotations
            .iter()
            .find(|a| a.text.starts_with("jx:area"))
            .unwrap();
        assert_eq!((area.row, area.col), (0, 0));
        // Bound B4 had one deleted row above it.
        assert_eq!(area.text, r#"jx:area(lastCell="B3")"#);

        let each = outcome
            .annotations
            .iter()
            .find(|a| a.text.starts_with("jx:each"))
            .unwrap();
        assert_eq!((each.row, each.col), (1, 0));
        assert_eq!(
            each.text,
            r#"jx:each(items="rows" var="r" lastCell="B2")"#
        );
    }

    #[test]
    fn test_adjusted_rows_decrease_across_blocks() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${a}" var="x">"#)],
                vec![text("${x.one}"), text("${x.two}")],
                vec![text("/jx:forEach")],
                vec![text(r#"<jx:forEach items="${b}" var="y">"#)],
                vec![text("${y.one}"), text("${y.two}")],
                vec![text("/jx:forEach")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.rows_deleted, 4);
        assert_eq!(outcome.sheet.rows.len(), 2);

        let eaches: Vec<&Annotation> = outcome
            .annotations
            .iter()
            .filter(|a| a.text.starts_with("jx:each"))
            .collect();
        assert_eq!(eaches.len(), 2);
        assert_eq!(eaches[0].row, 0);
        assert!(eaches[0].text.contains(r#"lastCell="B1""#));
        assert_eq!(eaches[1].row, 1);
        assert!(eaches[1].text.contains(r#"lastCell="B2""#));

        // Synthesized area covers both kept rows.
        let area = outcome
            .annotations
            .iter()
            .find(|a| a.text.starts_with("jx:area"))
            .unwrap();
        assert_eq!(area.text, r#"jx:area(lastCell="B2")"#);
        assert_eq!((area.row, area.col), (0, 0));
    }

    #[test]
    fn test_unmatched_block_is_skipped() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${list}" var="item">"#)],
                vec![text("${item.name}")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.rows_deleted, 0);
        assert_eq!(outcome.sheet.rows.len(), 2);
        assert_eq!(outcome.directives_found, 1);
        assert_eq!(outcome.directives_converted, 0);
        assert!(outcome.annotations.is_empty());
    }

    #[test]
    fn test_if_block_renames_parameter() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"jx:if(test="${show}")"#)],
                vec![text("visible"), text("row")],
                vec![text("/jx:if")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(
            outcome.annotations[0].text,
            r#"jx:if(condition="${show}" lastCell="B1")"#
        );
        assert_eq!(outcome.rows_deleted, 2);
    }

    #[test]
    fn test_multisheet_keeps_original_anchor() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"jx:multiSheet(data="names")"#)],
                vec![text("per-sheet"), text("content")],
            ],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.rows_deleted, 1);
        assert_eq!(outcome.sheet.rows.len(), 1);
        assert_eq!(
            outcome.annotations[0],
            Annotation {
                row: 0,
                col: 0,
                text: r#"jx:multiSheet(data="names")"#.to_string()
            }
        );
    }

    #[test]
    fn test_inline_out_substitution_in_place() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![vec![
                text(r#"Name: <jx:out select="user.name"/>"#),
                text(r#"<jx:out select="user.email"/>"#),
            ]],
        );
        let outcome = rewrite(&sheet);

        assert_eq!(outcome.sheet.rows[0][0], text("Name: ${user.name}"));
        assert_eq!(outcome.sheet.rows[0][1], text("${user.email}"));
        assert_eq!(outcome.rows_deleted, 0);
        assert!(outcome.annotations.is_empty());
        assert_eq!(outcome.directives_found, 2);
        assert_eq!(outcome.directives_converted, 2);
    }

    #[test]
    fn test_merged_ranges_follow_the_row_map() {
        let mut sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${l}" var="v">"#)],
                vec![text("${v.a}"), text("${v.b}")],
                vec![text("/jx:forEach")],
                vec![text("footer"), text("spans")],
            ],
        );
        // One range inside the block (spans the opening row), one below it.
        sheet.merged_ranges = vec![(0, 0, 1, 1), (3, 0, 3, 1)];
        sheet.row_heights = BTreeMap::from([(1, 400.0), (3, 300.0)]);

        let outcome = rewrite(&sheet);

        assert_eq!(outcome.sheet.merged_ranges, vec![(1, 0, 1, 1)]);
        assert_eq!(
            outcome.sheet.row_heights,
            BTreeMap::from([(0, 400.0), (1, 300.0)])
        );
        assert_eq!(
            outcome.row_map,
            BTreeMap::from([(1, 0), (3, 1)])
        );
    }

    #[test]
    fn test_empty_sheet_is_untouched() {
        let sheet = SheetData::new("Empty");
        let outcome = rewrite(&sheet);
        assert!(outcome.sheet.rows.is_empty());
        assert!(outcome.annotations.is_empty());
        assert_eq!(outcome.directives_converted, 0);
    }

    #[test]
    fn test_rerun_on_migrated_output_is_a_noop() {
        let first = rewrite(&SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${list}" var="item">"#)],
                vec![text("${item.name}")],
                vec![text("/jx:forEach")],
            ],
        ));
        let second = rewrite(&first.sheet);

        assert_eq!(second.directives_found, 0);
        assert_eq!(second.rows_deleted, 0);
        assert_eq!(second.sheet.rows, first.sheet.rows);
    }

    #[test]
    fn test_empty_block_anchors_on_directive_column() {
        // Opening directive in column C with an empty data row below.
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![
                    CellValue::Empty,
                    CellValue::Empty,
                    text(r#"<jx:forEach items="${l}" var="v">"#),
                ],
                vec![CellValue::Empty, CellValue::Empty, CellValue::Empty],
                vec![text("/jx:forEach")],
            ],
        );
        let outcome = rewrite(&sheet);

        // Nothing populated in the data row: both column scans fall back to
        // the directive's own column.
        assert_eq!(outcome.annotations[0].col, 2);
        assert!(outcome.annotations[0].text.contains(r#"lastCell="C1""#));
    }

    #[test]
    fn test_area_with_unparseable_bound_renders_verbatim() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"jx:multiSheet(data="d")"#)],
                vec![text("x")],
                vec![text("jx:area()")],
            ],
        );
        let outcome = rewrite(&sheet);

        let area = outcome
            .annotations
            .iter()
            .find(|a| a.text.starts_with("jx:area"))
            .unwrap();
        assert_eq!(area.text, r#"jx:area(lastCell="")"#);
        // Anchor still shifts past the deleted multiSheet row.
        assert_eq!(area.row, 1);
    }

    #[test]
    fn test_changes_use_one_based_rows() {
        let sheet = SheetData::from_rows(
            "Sheet1",
            vec![
                vec![text(r#"<jx:forEach items="${l}" var="v">"#)],
                vec![text("${v.x}")],
                vec![text("/jx:forEach")],
            ],
        );
        let outcome = rewrite(&sheet);

        let each_change = outcome
            .changes
            .iter()
            .find(|c| c.kind == ChangeKind::Each)
            .unwrap();
        assert_eq!(each_change.row, 1);
    }
}
