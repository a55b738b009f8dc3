//! Headless Chrome rendering session

use super::page::{mm_to_inches, PageSetup};
use super::{RenderBackend, RenderConfig, RenderingOracle};
use crate::error::{Error, Result};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const RESET_STYLE: &str = "html,body{margin:0;padding:0;}";
const FIT_STYLE_ID: &str = "multi-page-fit-style";

/// One browser, one tab, one document.
///
/// The browser process and the temporary directory holding the document are
/// released when the renderer is dropped.
pub struct ChromeRenderer {
    tab: Arc<Tab>,
    _browser: Browser,
    _workdir: TempDir,
    settle_delay: Duration,
    scale: f64,
}

impl ChromeRenderer {
    /// Launch Chrome and load `html` from a private temporary directory.
    pub fn open(html: &str, job_id: &str, config: &RenderConfig) -> Result<Self> {
        let workdir = tempfile::Builder::new().prefix("html2pdf-").tempdir()?;
        let html_path = workdir.path().join(format!("upload-{}.html", job_id));
        std::fs::write(&html_path, html)?;

        let browser = launch_browser(config)?;
        let tab = browser.new_tab().map_err(Error::render)?;
        tab.set_default_timeout(config.timeout);

        let url = file_url(&html_path)?;
        tracing::debug!(job_id, %url, "loading document");
        tab.navigate_to(&url).map_err(Error::render)?;
        tab.wait_until_navigated().map_err(Error::render)?;

        let renderer = Self {
            tab,
            _browser: browser,
            _workdir: workdir,
            settle_delay: config.settle_delay,
            scale: 1.0,
        };
        renderer.evaluate(&inject_style_script("html-fit-reset", RESET_STYLE))?;

        Ok(renderer)
    }

    fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let object = self.tab.evaluate(script, false).map_err(Error::render)?;
        Ok(object.value)
    }
}

impl RenderingOracle for ChromeRenderer {
    fn measure(&mut self, scale: f64) -> Result<f64> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(Error::invalid_input(format!(
                "scale must be in (0, 1], got {}",
                scale
            )));
        }

        if scale != self.scale {
            self.evaluate(&scale_script(scale))?;
            self.scale = scale;
            if !self.settle_delay.is_zero() {
                std::thread::sleep(self.settle_delay);
            }
        }

        let value = self.evaluate("document.documentElement.scrollHeight")?;
        let height = value
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                Error::render(format!("unexpected scrollHeight value: {:?}", value))
            })?;

        tracing::trace!(scale, height, "measured document");
        Ok(height)
    }

    fn print_pdf(&mut self, page: &PageSetup) -> Result<Vec<u8>> {
        let (paper_width, paper_height) = page.paper.size_inches();
        let options = PrintToPdfOptions {
            print_background: Some(true),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            margin_top: Some(mm_to_inches(page.margins.top)),
            margin_right: Some(mm_to_inches(page.margins.right)),
            margin_bottom: Some(mm_to_inches(page.margins.bottom)),
            margin_left: Some(mm_to_inches(page.margins.left)),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };

        self.tab.print_to_pdf(Some(options)).map_err(Error::render)
    }
}

/// [`RenderBackend`] launching a new Chrome per document
#[derive(Debug, Clone, Default)]
pub struct ChromeBackend {
    config: RenderConfig,
}

impl ChromeBackend {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }
}

impl RenderBackend for ChromeBackend {
    type Oracle = ChromeRenderer;

    fn open(&self, html: &str, job_id: &str) -> Result<ChromeRenderer> {
        ChromeRenderer::open(html, job_id, &self.config)
    }
}

fn launch_browser(config: &RenderConfig) -> Result<Browser> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .path(config.chrome_path.clone())
        .idle_browser_timeout(config.timeout)
        .build()
        .map_err(|e| Error::render(format!("invalid Chrome launch options: {}", e)))?;

    Browser::new(options).map_err(|e| Error::render(format!("failed to start Chrome: {}", e)))
}

fn file_url(path: &Path) -> Result<String> {
    url::Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| Error::render(format!("cannot build file URL for {}", path.display())))
}

/// Script adding (or replacing) a `<style>` element with the given id
fn inject_style_script(id: &str, css: &str) -> String {
    format!(
        r#"(function() {{
            let st = document.getElementById({id});
            if (!st) {{
                st = document.createElement('style');
                st.id = {id};
                (document.head || document.documentElement).appendChild(st);
            }}
            st.textContent = {css};
            return true;
        }})()"#,
        id = js_string(id),
        css = js_string(css),
    )
}

/// Script applying `scale` to the body; scale 1 removes the fit style
fn scale_script(scale: f64) -> String {
    if scale >= 1.0 {
        return format!(
            r#"(function() {{
                const st = document.getElementById({id});
                if (st) st.remove();
                return true;
            }})()"#,
            id = js_string(FIT_STYLE_ID),
        );
    }
    inject_style_script(FIT_STYLE_ID, &scale_css(scale))
}

fn scale_css(scale: f64) -> String {
    format!(
        "body{{transform-origin: top left; transform: scale({}); width:{}%;}}",
        scale,
        100.0 / scale
    )
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
