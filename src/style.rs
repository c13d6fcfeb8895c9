//! Format bridge: best-effort translation of legacy cell styling into
//! `rust_xlsxwriter` formats.
//!
//! Everything here is defensive. Style tables may be short or empty, indices
//! may dangle, and codes may be out of range; each aspect falls back to a
//! default without disturbing the others.

use once_cell::sync::Lazy;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, FormatUnderline};
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_FONT_NAME: &str = "Calibri";
const DEFAULT_FONT_SIZE: f64 = 11.0;

/// Legacy palette: the 25 well-known color indices. Index 0 is "automatic"
/// and maps to no explicit color, as do unknown indices.
pub static XLS_COLOR_PALETTE: Lazy<HashMap<u8, Option<u32>>> = Lazy::new(|| {
    HashMap::from([
        (0, None),
        (1, Some(0x000000)),
        (2, Some(0xFFFFFF)),
        (3, Some(0xFF0000)),
        (4, Some(0x00FF00)),
        (5, Some(0x0000FF)),
        (6, Some(0xFFFF00)),
        (7, Some(0xFF00FF)),
        (8, Some(0x00FFFF)),
        (9, Some(0x800000)),
        (10, Some(0x008000)),
        (11, Some(0x000080)),
        (12, Some(0x808000)),
        (13, Some(0x800080)),
        (14, Some(0x008080)),
        (15, Some(0xC0C0C0)),
        (16, Some(0x808080)),
        (17, Some(0x9999FF)),
        (18, Some(0x993366)),
        (19, Some(0xFFFFCC)),
        (20, Some(0xCCFFFF)),
        (21, Some(0x660066)),
        (22, Some(0xFF8080)),
        (23, Some(0x0066CC)),
        (24, Some(0xCCCCFF)),
    ])
});

/// RGB value for a legacy color index, when the palette knows it.
pub fn color_from_index(index: u8) -> Option<u32> {
    XLS_COLOR_PALETTE.get(&index).copied().flatten()
}

/// Legacy border line codes 0-7.
pub fn border_from_code(code: u8) -> FormatBorder {
    match code {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

/// Legacy horizontal alignment codes 0-7, defaulting to general.
pub fn horizontal_from_code(code: u8) -> FormatAlign {
    match code {
        1 => FormatAlign::Left,
        2 => FormatAlign::Center,
        3 => FormatAlign::Right,
        4 => FormatAlign::Fill,
        5 => FormatAlign::Justify,
        6 => FormatAlign::CenterAcross,
        7 => FormatAlign::Distributed,
        _ => FormatAlign::General,
    }
}

/// Legacy vertical alignment codes 0-4, defaulting to bottom.
pub fn vertical_from_code(code: u8) -> FormatAlign {
    match code {
        0 => FormatAlign::Top,
        1 => FormatAlign::VerticalCenter,
        3 => FormatAlign::VerticalJustify,
        4 => FormatAlign::VerticalDistributed,
        _ => FormatAlign::Bottom,
    }
}

/// Font height arrives in twips (1/20 point).
pub fn points_from_twips(twips: f64) -> f64 {
    twips / 20.0
}

/// Column widths arrive in 1/256 character units.
pub fn width_from_units(units: f64) -> f64 {
    units / 256.0
}

//==============================================================================
// Legacy Records
//==============================================================================

/// A font record as the legacy binary format carries it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyFont {
    /// Empty means unspecified.
    pub name: String,
    /// Height in twips; 0 means unspecified.
    pub height_twips: f64,
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub struck_out: bool,
    /// Palette index; 0 means automatic.
    pub color_index: u8,
}

/// A cell-format (XF) record: numeric codes straight from the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyXf {
    pub font_index: u32,
    pub fill_color_index: u8,
    pub border_top: u8,
    pub border_bottom: u8,
    pub border_left: u8,
    pub border_right: u8,
    pub horizontal: u8,
    pub vertical: u8,
    pub wrap_text: bool,
}

/// Shared style tables for one workbook, as far as the reader exposed them.
/// Both tables may be empty; cells then come through unstyled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTable {
    pub fonts: Vec<LegacyFont>,
    pub xfs: Vec<LegacyXf>,
}

impl StyleTable {
    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty() && self.xfs.is_empty()
    }
}

/// Build the output format for one cell-format index.
///
/// Aspect by aspect: font, fill, borders, alignment. A dangling index or
/// unknown code degrades that aspect to its default and the rest still apply.
pub fn xf_to_format(styles: &StyleTable, xf_index: u32) -> Format {
    let mut format = Format::new();

    let Some(xf) = styles.xfs.get(xf_index as usize) else {
        debug!("cell format index {} out of range; cell left unstyled", xf_index);
        return format;
    };

    // Font
    match styles.fonts.get(xf.font_index as usize) {
        Some(font) => {
            let name = if font.name.is_empty() {
                DEFAULT_FONT_NAME
            } else {
                font.name.as_str()
            };
            format = format.set_font_name(name);

            let size = if font.height_twips > 0.0 {
                points_from_twips(font.height_twips)
            } else {
                DEFAULT_FONT_SIZE
            };
            format = format.set_font_size(size);

            if font.bold {
                format = format.set_bold();
            }
            if font.italic {
                format = format.set_italic();
            }
            if font.underlined {
                format = format.set_underline(FormatUnderline::Single);
            }
            if font.struck_out {
                format = format.set_font_strikethrough();
            }
            if font.color_index != 0 {
                if let Some(rgb) = color_from_index(font.color_index) {
                    format = format.set_font_color(Color::RGB(rgb));
                }
            }
        }
        None => {
            debug!("font index {} out of range; using default font", xf.font_index);
            format = format
                .set_font_name(DEFAULT_FONT_NAME)
                .set_font_size(DEFAULT_FONT_SIZE);
        }
    }

    // Fill
    if let Some(rgb) = color_from_index(xf.fill_color_index) {
        format = format
            .set_background_color(Color::RGB(rgb))
            .set_pattern(FormatPattern::Solid);
    }

    // Borders
    format = format
        .set_border_top(border_from_code(xf.border_top))
        .set_border_bottom(border_from_code(xf.border_bottom))
        .set_border_left(border_from_code(xf.border_left))
        .set_border_right(border_from_code(xf.border_right));

    // Alignment
    format = format
        .set_align(horizontal_from_code(xf.horizontal))
        .set_align(vertical_from_code(xf.vertical));
    if xf.wrap_text {
        format = format.set_text_wrap();
    }

    format
}
