//! Rendering layer
//!
//! The rest of the crate sees the browser only through [`RenderingOracle`]:
//! lay the loaded document out at a scale and report its height, then print
//! it. [`ChromeRenderer`] implements it with headless Chrome.

mod chrome;
mod page;

pub use chrome::{ChromeBackend, ChromeRenderer};
pub use page::{Margins, PageSetup, PaperFormat, CSS_PX_PER_INCH};

use crate::error::Result;
use std::path::PathBuf;
use std::time::Duration;

/// A loaded document that can be measured at a scale and printed
pub trait RenderingOracle {
    /// Apply `scale` to the document and return its total content height in
    /// CSS pixels.
    fn measure(&mut self, scale: f64) -> Result<f64>;

    /// Print the document, at whatever scale was last applied, to PDF bytes.
    fn print_pdf(&mut self, page: &PageSetup) -> Result<Vec<u8>>;
}

impl<T: RenderingOracle + ?Sized> RenderingOracle for &mut T {
    fn measure(&mut self, scale: f64) -> Result<f64> {
        (**self).measure(scale)
    }

    fn print_pdf(&mut self, page: &PageSetup) -> Result<Vec<u8>> {
        (**self).print_pdf(page)
    }
}

/// Opens one [`RenderingOracle`] session per document
pub trait RenderBackend: Send + Sync + 'static {
    type Oracle: RenderingOracle;

    /// Load `html` into a fresh session. `job_id` names the session's
    /// temporary files.
    fn open(&self, html: &str, job_id: &str) -> Result<Self::Oracle>;
}

/// Browser settings shared by every rendering session
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Chrome/Chromium executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Upper bound for any single browser operation
    pub timeout: Duration,
    /// Pause after applying a scale before reading the height back
    pub settle_delay: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(60),
        }
    }
}
