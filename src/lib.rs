//! HTML fit-to-pages converter
//!
//! Renders HTML with headless Chrome and shrinks it until it fits a page
//! budget before printing to PDF. Exposed as MCP tools:
//! - `convert_html`: Convert an HTML document to a fitted PDF
//! - `analyze_fit`: Report the scale a document needs without printing
//! - `list_html`: List HTML files in a directory
//!
//! The `html2pdf` binary runs the same conversion from the command line.

pub mod config;
pub mod convert;
pub mod density;
pub mod error;
pub mod fit;
pub mod pdf;
pub mod render;
pub mod server;
pub mod source;

pub use config::ServerConfig;
pub use convert::{ConvertConfig, ConvertOutput, ConvertRequest, Converter};
pub use error::{Error, Result};
pub use fit::{fit, FitParams, FitRequest, FitResult, FitSolver};
pub use render::{ChromeBackend, PageSetup, RenderBackend, RenderingOracle};
pub use server::{
    run_server, run_server_with_config, AnalyzeFitParams, AnalyzeFitResult, ConvertHtmlParams,
    ConvertHtmlResult, HtmlFitServer, HtmlSource, ListHtmlParams, ListHtmlResult,
};
