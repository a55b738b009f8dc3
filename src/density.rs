//! Density reduction
//!
//! A one-shot transform applied to the HTML source before the first
//! measurement: smaller type, tighter leading and margins, and flowing text
//! blocks laid out in columns. It is independent of the scale the fit solver
//! later picks.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Id of the injected `<style>` element; its presence marks a reduced document
pub const DENSITY_STYLE_ID: &str = "density-reduction";

/// How aggressively to tighten the document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DensityProfile {
    /// Root font size relative to the document's own, in (0, 1]
    pub font_scale: f64,
    /// Unitless line height applied to body text
    pub line_height: f64,
    /// Body margin in millimetres
    pub margin_mm: f64,
    /// Column count for flowing text blocks; 1 disables columns
    pub columns: u32,
    /// Gap between columns in millimetres
    pub column_gap_mm: f64,
}

impl DensityProfile {
    /// The profile used when a request just asks for density reduction
    pub fn compact() -> Self {
        Self {
            font_scale: 0.9,
            line_height: 1.25,
            margin_mm: 6.0,
            columns: 2,
            column_gap_mm: 6.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.font_scale > 0.0 && self.font_scale <= 1.0) {
            return Err(Error::invalid_input(format!(
                "font_scale must be in (0, 1], got {}",
                self.font_scale
            )));
        }
        if !(self.line_height > 0.0 && self.line_height.is_finite()) {
            return Err(Error::invalid_input("line_height must be positive"));
        }
        if !(self.margin_mm >= 0.0 && self.margin_mm.is_finite())
            || !(self.column_gap_mm >= 0.0 && self.column_gap_mm.is_finite())
        {
            return Err(Error::invalid_input("margins and gaps must be non-negative"));
        }
        if self.columns == 0 {
            return Err(Error::invalid_input("columns must be at least 1"));
        }
        Ok(())
    }

    /// Stylesheet implementing this profile
    pub fn stylesheet(&self) -> String {
        let mut css = format!(
            "html{{font-size:{pct}%;}}\
             body{{margin:{margin}mm;line-height:{lh};}}\
             p,li,dd,blockquote{{margin-top:0.3em;margin-bottom:0.3em;}}\
             h1,h2,h3,h4,h5,h6{{margin-top:0.6em;margin-bottom:0.3em;line-height:1.15;}}\
             ul,ol{{padding-left:1.2em;}}",
            pct = round_css(self.font_scale * 100.0),
            margin = round_css(self.margin_mm),
            lh = round_css(self.line_height),
        );

        if self.columns > 1 {
            css.push_str(&format!(
                "article,section,.flow{{column-count:{cols};column-gap:{gap}mm;}}\
                 article h1,article h2,article h3,section h1,section h2,section h3,\
                 .flow h1,.flow h2,.flow h3{{column-span:all;}}\
                 table,figure,img,pre{{break-inside:avoid;}}",
                cols = self.columns,
                gap = round_css(self.column_gap_mm),
            ));
        }

        css
    }
}

impl Default for DensityProfile {
    fn default() -> Self {
        Self::compact()
    }
}

/// Whether the density stylesheet has already been injected
pub fn is_density_reduced(html: &str) -> bool {
    let marker = format!("<style id=\"{}\"", DENSITY_STYLE_ID);
    html.to_ascii_lowercase().contains(&marker)
}

/// Inject the density stylesheet into `html`.
///
/// The style goes before `</head>` when there is one, otherwise right after
/// the opening `<html>` tag, otherwise at the very start. A document that
/// already carries the stylesheet is returned unchanged.
pub fn reduce_density(html: &str, profile: &DensityProfile) -> Result<String> {
    profile.validate()?;

    if is_density_reduced(html) {
        return Ok(html.to_string());
    }

    let style = format!(
        "<style id=\"{}\">{}</style>",
        DENSITY_STYLE_ID,
        profile.stylesheet()
    );
    let lower = html.to_ascii_lowercase();

    let insert_at = if let Some(pos) = find_tag(&lower, "</head") {
        pos
    } else if let Some(end) = opening_tag_end(&lower, "<html") {
        end
    } else {
        0
    };

    let mut out = String::with_capacity(html.len() + style.len());
    out.push_str(&html[..insert_at]);
    out.push_str(&style);
    out.push_str(&html[insert_at..]);
    Ok(out)
}

/// Byte offset of the first `tag` that is followed by `>` or whitespace,
/// so `</head` does not match `</header`
fn find_tag(lower: &str, tag: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = lower[from..].find(tag) {
        let start = from + rel;
        let after = start + tag.len();
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') => {
                return Some(start)
            }
            _ => from = after,
        }
    }
    None
}

/// Byte offset just past the `>` closing the first `tag` opening
fn opening_tag_end(lower: &str, tag: &str) -> Option<usize> {
    let after = find_tag(lower, tag)? + tag.len();
    lower[after..].find('>').map(|gt| after + gt + 1)
}

fn round_css(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
