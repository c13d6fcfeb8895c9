//! jxlsmig - JXLS 1.x → 2.x Excel template migration
//!
//! This library locates legacy JXLS 1.x directives embedded in spreadsheet
//! cells, rewrites them into the comment-based JXLS 2.x syntax, and writes
//! the result as a modern workbook with layout and formatting preserved.
//!
//! # Features
//!
//! - Tag and call directive grammars (`<jx:forEach ...>`, `jx:if(...)`)
//! - Block rewriting: marker rows removed, directives re-anchored as comments
//! - Inline `<jx:out .../>` substitution to `${...}` expressions
//! - Area synthesis when a template never declared one
//! - Container sniffing by file header with automatic reader fallback
//! - Batch migration with Markdown + JSON reports
//!
//! # Example
//!
//! ```
//! use jxlsmig::rewrite::rewrite_sheet;
//! use jxlsmig::scanner::scan_sheet;
//! use jxlsmig::types::{CellValue, SheetData};
//!
//! let sheet = SheetData::from_rows(
//!     "Report",
//!     vec![
//!         vec![CellValue::Text("<jx:forEach items=\"${rows}\" var=\"r\">".into())],
//!         vec![CellValue::Text("${r.name}".into())],
//!         vec![CellValue::Text("</jx:forEach>".into())],
//!     ],
//! );
//!
//! let directives = scan_sheet(&sheet);
//! let outcome = rewrite_sheet(&sheet, &directives);
//!
//! // The marker rows are gone and the loop lives on as a cell comment.
//! assert_eq!(outcome.sheet.row_count(), 1);
//! assert_eq!(
//!     outcome.annotations[0].text,
//!     "jx:each(items=\"rows\" var=\"r\" lastCell=\"A1\")"
//! );
//! ```

pub mod cli;
pub mod directive;
pub mod error;
pub mod excel;
pub mod migrate;
pub mod report;
pub mod rewrite;
pub mod scanner;
pub mod sniff;
pub mod style;
pub mod types;

// Re-export commonly used types
pub use error::{MigrateError, MigrateResult};
pub use migrate::{MigrateOptions, Migrator};
pub use types::{MigrationResult, SheetData};
