//! Workbook I/O: loading spreadsheet files into the in-memory sheet model
//! and materializing rewritten sheets back out as modern .xlsx files.

mod reader;
mod writer;

pub use reader::WorkbookReader;
pub use writer::WorkbookWriter;
