//! Container format detection from file signatures.

use calamine::{open_workbook, Xlsx};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// OLE2/CFB signature carried by legacy binary workbooks.
const OLE2_MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Raw sniffing verdict. `Unknown` means the header matched no known
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Legacy,
    Modern,
    Unknown,
}

/// Format a migration attempt runs under. Produced by [`safe_detect`], which
/// never leaves the question open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// Legacy Excel binary format (.xls)
    Legacy,
    /// Office Open XML workbook (.xlsx)
    Modern,
}

impl WorkbookFormat {
    pub fn opposite(self) -> Self {
        match self {
            WorkbookFormat::Legacy => WorkbookFormat::Modern,
            WorkbookFormat::Modern => WorkbookFormat::Legacy,
        }
    }
}

impl std::fmt::Display for WorkbookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkbookFormat::Legacy => write!(f, "xls"),
            WorkbookFormat::Modern => write!(f, "xlsx"),
        }
    }
}

/// Classify a file by its first 8 bytes. Never fails: unreadable files come
/// back as `Unknown`.
pub fn detect(path: &Path) -> DetectedFormat {
    let header = match read_header(path) {
        Ok(h) => h,
        Err(e) => {
            debug!("could not read header of {}: {}", path.display(), e);
            return DetectedFormat::Unknown;
        }
    };

    if &header == OLE2_MAGIC {
        return DetectedFormat::Legacy;
    }

    if header.starts_with(b"PK") {
        // A zip container is only a modern workbook if the modern reader
        // accepts it; otherwise treat it as legacy and let the fallback
        // attempt sort it out.
        let probe: Result<Xlsx<std::io::BufReader<File>>, _> = open_workbook(path);
        return match probe {
            Ok(_) => DetectedFormat::Modern,
            Err(e) => {
                debug!(
                    "zip header but modern open failed for {}: {}",
                    path.display(),
                    e
                );
                DetectedFormat::Legacy
            }
        };
    }

    DetectedFormat::Unknown
}

/// Resolve a file to a concrete format: magic bytes first, extension as the
/// fallback, legacy as the hard default. A magic/extension disagreement logs
/// a warning and trusts the magic.
pub fn safe_detect(path: &Path) -> WorkbookFormat {
    let by_extension = extension_hint(path);

    match detect(path) {
        DetectedFormat::Legacy => {
            if by_extension == Some(WorkbookFormat::Modern) {
                warn!(
                    "{} has a modern extension but legacy magic bytes; treating as xls",
                    path.display()
                );
            }
            WorkbookFormat::Legacy
        }
        DetectedFormat::Modern => {
            if by_extension == Some(WorkbookFormat::Legacy) {
                warn!(
                    "{} has a legacy extension but modern magic bytes; treating as xlsx",
                    path.display()
                );
            }
            WorkbookFormat::Modern
        }
        DetectedFormat::Unknown => {
            let fallback = by_extension.unwrap_or(WorkbookFormat::Legacy);
            debug!(
                "no recognizable magic in {}; falling back to {} by extension",
                path.display(),
                fallback
            );
            fallback
        }
    }
}

fn extension_hint(path: &Path) -> Option<WorkbookFormat> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "xlsx" | "xlsm" => Some(WorkbookFormat::Modern),
        "xls" => Some(WorkbookFormat::Legacy),
        _ => None,
    }
}

fn read_header(path: &Path) -> std::io::Result<[u8; 8]> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 8];
    file.read_exact(&mut header)?;
    Ok(header)
}
