//! Paper formats, margins and printable area

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CSS reference pixels per inch
pub const CSS_PX_PER_INCH: f64 = 96.0;

const MM_PER_INCH: f64 = 25.4;

/// Supported output paper sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaperFormat {
    #[default]
    Letter,
    A4,
    Legal,
}

impl PaperFormat {
    /// Width and height in inches (portrait)
    pub fn size_inches(&self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::A4 => (210.0 / MM_PER_INCH, 297.0 / MM_PER_INCH),
            PaperFormat::Legal => (8.5, 14.0),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "letter" => Ok(PaperFormat::Letter),
            "a4" => Ok(PaperFormat::A4),
            "legal" => Ok(PaperFormat::Legal),
            other => Err(Error::invalid_input(format!(
                "unknown paper format '{}' (expected letter, a4 or legal)",
                other
            ))),
        }
    }
}

/// Page margins in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn uniform(mm: f64) -> Self {
        Self {
            top: mm,
            right: mm,
            bottom: mm,
            left: mm,
        }
    }

    /// Parse `"12"` (all sides) or `"T,R,B,L"`
    pub fn parse(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim().parse::<f64>().map_err(|_| {
                    Error::invalid_input(format!("invalid margin value '{}'", part.trim()))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::invalid_input(format!(
                "margins must be non-negative, got '{}'",
                s
            )));
        }

        match values.as_slice() {
            [all] => Ok(Self::uniform(*all)),
            [top, right, bottom, left] => Ok(Self {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => Err(Error::invalid_input(format!(
                "expected 1 or 4 comma-separated margins, got '{}'",
                s
            ))),
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(12.0)
    }
}

/// Paper and margins used for both measuring and printing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PageSetup {
    pub paper: PaperFormat,
    pub margins: Margins,
}

impl PageSetup {
    pub fn new(paper: PaperFormat, margins: Margins) -> Self {
        Self { paper, margins }
    }

    /// Usable content height of one page in CSS pixels
    pub fn printable_height_px(&self) -> f64 {
        let (_, height) = self.paper.size_inches();
        let usable = height - mm_to_inches(self.margins.top + self.margins.bottom);
        (usable * CSS_PX_PER_INCH).max(0.0)
    }
}

pub(crate) fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}
