//! Server configuration
//!
//! Defaults are usable as-is; environment variables override them.

use crate::convert::ConvertConfig;
use crate::error::{Error, Result};
use crate::render::PaperFormat;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Security, resource and conversion settings for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories HTML files may be read from; empty allows any path
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 5MB)
    pub max_download_bytes: u64,
    /// Maximum size of an HTML document from any source (default: 5MB)
    pub max_html_bytes: u64,
    /// Maximum total bytes in the document cache (default: 64MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cached documents (default: 100)
    pub cache_max_entries: usize,
    /// Conversion settings
    pub convert: ConvertConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 5 * 1024 * 1024, // 5MB
            max_html_bytes: 5 * 1024 * 1024,     // 5MB
            cache_max_bytes: 64 * 1024 * 1024,   // 64MB
            cache_max_entries: 100,
            convert: ConvertConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Recognized variables:
    /// `MAX_PAGES`, `TWO_PAGE_FIT`, `CHROMIUM_PATH`, `PUPPETEER_EXECUTABLE_PATH`,
    /// `HTML_FIT_OUTPUT_DIR`, `HTML_FIT_RESOURCE_DIRS` (comma separated),
    /// `HTML_FIT_PAPER`, `HTML_FIT_PAGE_CAPACITY_PX`, `HTML_FIT_MIN_SCALE`,
    /// `HTML_FIT_DAMPING`, `HTML_FIT_RENDER_TIMEOUT_SECS`,
    /// `HTML_FIT_ALLOW_PRIVATE_URLS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("MAX_PAGES") {
            let pages: u32 = parse("MAX_PAGES", &v)?;
            if pages == 0 {
                return Err(config_error("MAX_PAGES", "must be at least 1"));
            }
            config.convert.default_max_pages = pages;
        }
        if let Some(v) = get("TWO_PAGE_FIT") {
            // Only an explicit "false" disables fitting.
            config.convert.fit_enabled = !v.eq_ignore_ascii_case("false");
        }
        if let Some(path) = get("CHROMIUM_PATH").or_else(|| get("PUPPETEER_EXECUTABLE_PATH")) {
            config.convert.render.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = get("HTML_FIT_OUTPUT_DIR") {
            config.convert.output_dir = PathBuf::from(dir);
        }
        if let Some(dirs) = get("HTML_FIT_RESOURCE_DIRS") {
            config.resource_dirs = dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("HTML_FIT_PAPER") {
            config.convert.page.paper = PaperFormat::from_str(&v)
                .map_err(|_| config_error("HTML_FIT_PAPER", "expected letter, a4 or legal"))?;
        }
        if let Some(v) = get("HTML_FIT_PAGE_CAPACITY_PX") {
            let capacity: f64 = parse("HTML_FIT_PAGE_CAPACITY_PX", &v)?;
            if !(capacity > 0.0 && capacity.is_finite()) {
                return Err(config_error("HTML_FIT_PAGE_CAPACITY_PX", "must be positive"));
            }
            config.convert.per_page_capacity_px = Some(capacity);
        }
        if let Some(v) = get("HTML_FIT_MIN_SCALE") {
            config.convert.fit_params.min_scale = parse("HTML_FIT_MIN_SCALE", &v)?;
        }
        if let Some(v) = get("HTML_FIT_DAMPING") {
            config.convert.fit_params.damping = parse("HTML_FIT_DAMPING", &v)?;
        }
        config
            .convert
            .fit_params
            .validate()
            .map_err(|e| config_error("HTML_FIT_MIN_SCALE/HTML_FIT_DAMPING", e.to_string()))?;
        if let Some(v) = get("HTML_FIT_RENDER_TIMEOUT_SECS") {
            let secs: u64 = parse("HTML_FIT_RENDER_TIMEOUT_SECS", &v)?;
            config.convert.render.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(v) = get("HTML_FIT_ALLOW_PRIVATE_URLS") {
            config.allow_private_urls = parse_bool("HTML_FIT_ALLOW_PRIVATE_URLS", &v)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| config_error(key, format!("cannot parse '{}'", value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(config_error(key, format!("expected a boolean, got '{}'", value))),
    }
}

fn config_error(key: &str, reason: impl Into<String>) -> Error {
    Error::Config {
        key: key.to_string(),
        reason: reason.into(),
    }
}
