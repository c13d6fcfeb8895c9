//! Cell-by-cell directive detection.

use crate::directive::{
    AreaDirective, ConditionalDirective, Directive, EachDirective, FoundDirective,
    MultiSheetDirective, OutputDirective,
};
use crate::types::{CellLocation, SheetData};
use tracing::debug;

/// Walk every cell of a sheet in row-major order and collect the directives
/// whose signature matches.
///
/// Classification is first-match-wins over an ordered signature list using
/// case-insensitive substring containment. Text starting with `/` is a
/// closing delimiter and is never an opening directive; the engine pairs
/// those up later. Construction never fails; unparseable text yields a
/// directive with empty parameters, surfaced only through logging.
pub fn scan_sheet(sheet: &SheetData) -> Vec<FoundDirective> {
    let mut found = Vec::new();

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let Some(text) = cell.as_str() else {
                continue;
            };
            let value = text.trim();
            if value.is_empty() {
                continue;
            }

            let lower = value.to_lowercase();
            let opening = !value.starts_with('/');

            let directive = if lower.contains("jx:area") && opening {
                Some(Directive::Area(AreaDirective::parse(value)))
            } else if lower.contains("jx:foreach") && opening {
                Some(Directive::Each(EachDirective::parse(value)))
            } else if lower.contains("jx:if") && opening {
                Some(Directive::Conditional(ConditionalDirective::parse(value)))
            } else if lower.contains("jx:multisheet") && opening {
                Some(Directive::MultiSheet(MultiSheetDirective::parse(value)))
            } else if lower.contains("<jx:out") || lower.contains("jx:out(") {
                Some(Directive::Output(OutputDirective::parse(value)))
            } else {
                None
            };

            if let Some(directive) = directive {
                debug!(
                    "found {} directive in sheet '{}' at row {} col {}: {}",
                    directive.name(),
                    sheet.name,
                    row_idx + 1,
                    col_idx + 1,
                    value
                );
                let location = CellLocation::new(row_idx as u32, col_idx as u32, sheet.name.clone());
                found.push(FoundDirective::new(directive, location, value));
            }
        }
    }

    found
}
