//! Directive model: parsing raw JXLS 1.x cell text into structured
//! parameters and rendering the JXLS 2.x replacement syntax.

use crate::types::{CellLocation, ChangeKind};
use once_cell::sync::Lazy;
use regex::Regex;

static AREA_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:area\s*\(\s*lastCell\s*=\s*["']([^"']*)["']\s*\)"#).unwrap()
});
static AREA_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)jx:area\s+lastCell\s*=\s*["']([^"']*)["']"#).unwrap());

static EACH_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:forEach\s+items\s*=\s*["']([^"']*)["']\s+var\s*=\s*["']([^"']*)["']"#)
        .unwrap()
});
static EACH_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)jx:forEach\s*\(\s*items\s*=\s*["']([^"']*)["']\s*,\s*var\s*=\s*["']([^"']*)["']"#,
    )
    .unwrap()
});

static IF_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:if\s*\(\s*(?:test|condition)\s*=\s*["']([^"']*)["']"#).unwrap()
});
static IF_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:if\s+(?:test|condition)\s*=\s*["']([^"']*)["']"#).unwrap()
});

static OUT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<jx:out\s+select="([^"]+)"\s*/?>"#).unwrap());
static OUT_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:out\s*\(\s*select\s*=\s*["']([^"']*)["']\s*\)"#).unwrap()
});

static MULTISHEET_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)jx:multiSheet\s*\(\s*data\s*=\s*["']([^"']*)["']"#).unwrap()
});
static MULTISHEET_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)jx:multiSheet\s+data\s*=\s*["']([^"']*)["']"#).unwrap());

/// `name="value"` / `name='value'` attribute pairs, for the optional
/// parameters shared by several directives.
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z]+)\s*=\s*["']([^"']*)["']"#).unwrap());

/// `${expr}` interpolation markers.
static BRACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Drop one layer of surrounding angle brackets, turning the pseudo-XML tag
/// form into bare attribute text.
fn strip_brackets(text: &str) -> &str {
    let t = text.trim();
    if t.len() >= 2 && t.starts_with('<') && t.ends_with('>') {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

/// Unwrap `${...}` markers, keeping the inner expression.
fn strip_interpolation(value: &str) -> String {
    BRACES_RE.replace_all(value, "$1").into_owned()
}

/// First occurrence of a named attribute, case-insensitive on the name.
fn attr(text: &str, name: &str) -> Option<String> {
    ATTR_RE
        .captures_iter(text)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .map(|caps| caps[2].to_string())
}

//==============================================================================
// Directive Variants
//==============================================================================

/// `jx:area`: declares the rectangular bound of a templated region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaDirective {
    pub last_cell: Option<String>,
}

impl AreaDirective {
    pub fn parse(raw: &str) -> Self {
        let text = strip_brackets(raw);
        let last_cell = [&*AREA_CALL_RE, &*AREA_TAG_RE]
            .iter()
            .find_map(|re| re.captures(text))
            .map(|caps| caps[1].to_string());
        Self { last_cell }
    }

    /// Render with `override_cell` when supplied, else the parsed bound.
    pub fn render(&self, override_cell: Option<&str>) -> String {
        let cell = override_cell.or(self.last_cell.as_deref()).unwrap_or("");
        format!(r#"jx:area(lastCell="{}")"#, cell)
    }
}

/// `jx:forEach`: row iteration, rewritten to `jx:each`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EachDirective {
    pub items: Option<String>,
    pub var: Option<String>,
    pub var_status: Option<String>,
    pub direction: Option<String>,
    pub multisheet: Option<String>,
    pub select: Option<String>,
    pub group_by: Option<String>,
    pub group_order: Option<String>,
}

impl EachDirective {
    pub fn parse(raw: &str) -> Self {
        let text = strip_brackets(raw);
        let mut directive = Self::default();

        // Tag-attribute form first, call form second. Interpolation braces
        // are stripped from items/var only.
        if let Some(caps) = [&*EACH_TAG_RE, &*EACH_CALL_RE]
            .iter()
            .find_map(|re| re.captures(text))
        {
            directive.items = Some(strip_interpolation(&caps[1]));
            directive.var = Some(strip_interpolation(&caps[2]));
        }

        directive.var_status = attr(text, "varStatus");
        directive.direction = attr(text, "direction");
        directive.multisheet = attr(text, "multisheet");
        directive.select = attr(text, "select");
        directive.group_by = attr(text, "groupBy");
        directive.group_order = attr(text, "groupOrder");
        directive
    }

    pub fn render(&self, last_cell: &str) -> String {
        let mut out = format!(
            r#"jx:each(items="{}" var="{}" lastCell="{}""#,
            self.items.as_deref().unwrap_or(""),
            self.var.as_deref().unwrap_or(""),
            last_cell
        );
        for (name, value) in [
            ("direction", &self.direction),
            ("multisheet", &self.multisheet),
            ("select", &self.select),
            ("groupBy", &self.group_by),
            ("groupOrder", &self.group_order),
        ] {
            if let Some(v) = value {
                out.push_str(&format!(r#" {}="{}""#, name, v));
            }
        }
        // JXLS 2.x has no varStatus equivalent; flag it for the caller.
        if self.var_status.is_some() {
            out.push_str(" # NOTE: varStatus must be implemented manually in Java code");
        }
        out.push(')');
        out
    }
}

/// `jx:if`: conditional block; the legacy `test` parameter becomes
/// `condition`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalDirective {
    pub condition: Option<String>,
    pub direction: Option<String>,
    pub multisheet: Option<String>,
    pub last_cell: Option<String>,
    pub areas: Option<String>,
}

impl ConditionalDirective {
    pub fn parse(raw: &str) -> Self {
        let text = strip_brackets(raw);
        let condition = [&*IF_CALL_RE, &*IF_TAG_RE]
            .iter()
            .find_map(|re| re.captures(text))
            .map(|caps| caps[1].to_string());
        Self {
            condition,
            direction: attr(text, "direction"),
            multisheet: attr(text, "multisheet"),
            last_cell: attr(text, "lastCell"),
            areas: attr(text, "areas"),
        }
    }

    pub fn render(&self, last_cell: &str) -> String {
        let mut out = format!(
            r#"jx:if(condition="{}" lastCell="{}""#,
            self.condition.as_deref().unwrap_or(""),
            last_cell
        );
        for (name, value) in [
            ("direction", &self.direction),
            ("multisheet", &self.multisheet),
            ("areas", &self.areas),
        ] {
            if let Some(v) = value {
                out.push_str(&format!(r#" {}="{}""#, name, v));
            }
        }
        out.push(')');
        out
    }
}

/// `jx:out`: single-cell output, rewritten to a `${}` expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDirective {
    pub select: Option<String>,
}

impl OutputDirective {
    pub fn parse(raw: &str) -> Self {
        let select = [&*OUT_TAG_RE, &*OUT_CALL_RE]
            .iter()
            .find_map(|re| re.captures(raw))
            .map(|caps| caps[1].to_string());
        Self { select }
    }

    pub fn render(&self) -> String {
        format!("${{{}}}", self.select.as_deref().unwrap_or(""))
    }
}

/// `jx:multiSheet`: fan a template out over a list of sheet names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiSheetDirective {
    pub data: Option<String>,
}

impl MultiSheetDirective {
    pub fn parse(raw: &str) -> Self {
        let data = [&*MULTISHEET_CALL_RE, &*MULTISHEET_TAG_RE]
            .iter()
            .find_map(|re| re.captures(raw))
            .map(|caps| caps[1].to_string());
        Self { data }
    }

    pub fn render(&self) -> String {
        format!(r#"jx:multiSheet(data="{}")"#, self.data.as_deref().unwrap_or(""))
    }
}

//==============================================================================
// Dispatch
//==============================================================================

/// Tagged union over every directive kind the scanner recognizes.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Area(AreaDirective),
    Each(EachDirective),
    Conditional(ConditionalDirective),
    Output(OutputDirective),
    MultiSheet(MultiSheetDirective),
}

impl Directive {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Directive::Area(_) => ChangeKind::Area,
            Directive::Each(_) => ChangeKind::Each,
            Directive::Conditional(_) => ChangeKind::Conditional,
            Directive::Output(_) => ChangeKind::Output,
            Directive::MultiSheet(_) => ChangeKind::MultiSheet,
        }
    }

    /// Source-vocabulary name, for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Area(_) => "area",
            Directive::Each(_) => "forEach",
            Directive::Conditional(_) => "if",
            Directive::Output(_) => "out",
            Directive::MultiSheet(_) => "multiSheet",
        }
    }
}

/// A directive located by the scanner: the parsed form plus where it came
/// from.
#[derive(Debug, Clone)]
pub struct FoundDirective {
    pub directive: Directive,
    pub location: CellLocation,
    pub raw: String,
    /// Reserved for multi-pass rewriting; nothing toggles it today.
    pub processed: bool,
}

impl FoundDirective {
    pub fn new(directive: Directive, location: CellLocation, raw: impl Into<String>) -> Self {
        Self {
            directive,
            location,
            raw: raw.into(),
            processed: false,
        }
    }
}

/// Replace every inline output directive (tag or call form) in `text` with
/// its `${}` expression. Returns the rewritten text and how many
/// substitutions were made.
pub fn substitute_inline_out(text: &str) -> (String, usize) {
    let mut count = OUT_TAG_RE.find_iter(text).count();
    let pass = OUT_TAG_RE.replace_all(text, |caps: &regex::Captures| {
        format!("${{{}}}", &caps[1])
    });
    count += OUT_CALL_RE.find_iter(&pass).count();
    let done = OUT_CALL_RE.replace_all(&pass, |caps: &regex::Captures| {
        format!("${{{}}}", &caps[1])
    });
    (done.into_owned(), count)
}
