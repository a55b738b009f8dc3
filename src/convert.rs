//! Conversion orchestrator
//!
//! Drives one request end to end: density preprocessing, a rendering session,
//! the fit solver, printing, post-processing and persistence. Each request
//! owns its rendering session; nothing is shared between requests.

use crate::density::{reduce_density, DensityProfile};
use crate::error::{Error, Result};
use crate::fit::{FitParams, FitRequest, FitResult, FitSolver};
use crate::pdf::QpdfWrapper;
use crate::render::{ChromeBackend, PageSetup, RenderBackend, RenderConfig, RenderingOracle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default page budget
pub const DEFAULT_MAX_PAGES: u32 = 2;

/// Conversion settings shared by all requests
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Directory generated PDFs are stored in
    pub output_dir: PathBuf,
    /// Page budget when a request does not name one
    pub default_max_pages: u32,
    /// Whether fitting runs when a request does not say
    pub fit_enabled: bool,
    /// Paper and margins for printing
    pub page: PageSetup,
    /// Override for the per-page capacity; derived from `page` when `None`
    pub per_page_capacity_px: Option<f64>,
    pub fit_params: FitParams,
    pub density: DensityProfile,
    pub render: RenderConfig,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("generated"),
            default_max_pages: DEFAULT_MAX_PAGES,
            fit_enabled: true,
            page: PageSetup::default(),
            per_page_capacity_px: None,
            fit_params: FitParams::default(),
            density: DensityProfile::compact(),
            render: RenderConfig::default(),
        }
    }
}

impl ConvertConfig {
    /// Printable height per page fed to the solver
    pub fn per_page_capacity_px(&self) -> f64 {
        self.per_page_capacity_px
            .unwrap_or_else(|| self.page.printable_height_px())
    }
}

/// One document to convert
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub html: Arc<str>,
    /// Stem of the stored file name
    pub base_name: String,
    pub max_pages: Option<u32>,
    pub density_reduction: bool,
    /// Per-request override of `ConvertConfig::fit_enabled`
    pub fit: Option<bool>,
    /// Rewrite the PDF through qpdf
    pub optimize: bool,
    /// Store the PDF in the output directory
    pub persist: bool,
}

impl ConvertRequest {
    pub fn new(html: impl Into<Arc<str>>, base_name: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            base_name: base_name.into(),
            max_pages: None,
            density_reduction: false,
            fit: None,
            optimize: false,
            persist: true,
        }
    }
}

/// A generated PDF and what it took to produce it
#[derive(Debug, Clone)]
pub struct ConvertOutput {
    pub job_id: String,
    pub pdf: Vec<u8>,
    pub stored_path: Option<PathBuf>,
    /// Page count of the printed PDF, when qpdf could read it
    pub page_count: Option<u32>,
    pub max_pages: u32,
    pub fit: Option<FitResult>,
    pub density_reduced: bool,
}

/// Converts HTML to PDF through a [`RenderBackend`]
pub struct Converter<B: RenderBackend = ChromeBackend> {
    backend: Arc<B>,
    config: Arc<ConvertConfig>,
    solver: FitSolver,
}

impl<B: RenderBackend> Clone for Converter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            solver: self.solver,
        }
    }
}

impl Converter<ChromeBackend> {
    /// Converter rendering with headless Chrome
    pub fn chrome(config: ConvertConfig) -> Result<Self> {
        let backend = ChromeBackend::new(config.render.clone());
        Self::with_backend(backend, config)
    }
}

impl<B: RenderBackend> Converter<B> {
    pub fn with_backend(backend: B, config: ConvertConfig) -> Result<Self> {
        let solver = FitSolver::new(config.fit_params)?;
        config.density.validate()?;

        let capacity = config.per_page_capacity_px();
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(Error::invalid_input(format!(
                "per-page capacity must be positive, got {} (check paper size and margins)",
                capacity
            )));
        }
        if config.default_max_pages == 0 {
            return Err(Error::invalid_input("default max pages must be at least 1"));
        }

        Ok(Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
            solver,
        })
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert on a blocking worker thread
    pub async fn convert(&self, request: ConvertRequest) -> Result<ConvertOutput> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.convert_blocking(request))
            .await
            .map_err(|e| Error::render(format!("Task join error: {}", e)))?
    }

    /// Measure and fit without printing or storing anything
    pub async fn analyze(&self, request: ConvertRequest) -> Result<FitResult> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.analyze_blocking(request))
            .await
            .map_err(|e| Error::render(format!("Task join error: {}", e)))?
    }

    pub fn convert_blocking(&self, request: ConvertRequest) -> Result<ConvertOutput> {
        let prepared = self.prepare(&request)?;
        let job_id = new_job_id();
        let _span = tracing::info_span!("convert", job_id = %job_id).entered();

        let (fit, pdf) = {
            let mut oracle = self.backend.open(&prepared.html, &job_id)?;
            let fit = if request.fit.unwrap_or(self.config.fit_enabled) {
                Some(self.fit_document(&mut oracle, &prepared)?)
            } else {
                None
            };
            let pdf = oracle.print_pdf(&self.config.page)?;
            (fit, pdf)
        };

        let pdf = if request.optimize {
            let optimized = QpdfWrapper::optimize(&pdf)?;
            tracing::debug!(before = pdf.len(), after = optimized.len(), "optimized PDF");
            optimized
        } else {
            pdf
        };

        let page_count = match QpdfWrapper::page_count(&pdf) {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "could not count pages of generated PDF");
                None
            }
        };

        let stored_path = if request.persist {
            Some(self.store(&request.base_name, &job_id, &pdf)?)
        } else {
            None
        };

        tracing::info!(
            max_pages = prepared.max_pages,
            page_count = ?page_count,
            bytes = pdf.len(),
            final_scale = ?fit.as_ref().map(|f| f.final_scale),
            "converted HTML to PDF"
        );

        Ok(ConvertOutput {
            job_id,
            pdf,
            stored_path,
            page_count,
            max_pages: prepared.max_pages,
            fit,
            density_reduced: prepared.density_reduced,
        })
    }

    pub fn analyze_blocking(&self, request: ConvertRequest) -> Result<FitResult> {
        let prepared = self.prepare(&request)?;
        let job_id = new_job_id();
        let _span = tracing::info_span!("analyze", job_id = %job_id).entered();

        let mut oracle = self.backend.open(&prepared.html, &job_id)?;
        self.fit_document(&mut oracle, &prepared)
    }

    fn prepare(&self, request: &ConvertRequest) -> Result<Prepared> {
        let max_pages = request.max_pages.unwrap_or(self.config.default_max_pages);
        if max_pages == 0 {
            return Err(Error::invalid_input("max_pages must be at least 1"));
        }

        let (html, density_reduced) = if request.density_reduction {
            let reduced = reduce_density(&request.html, &self.config.density)?;
            (Arc::from(reduced), true)
        } else {
            (Arc::clone(&request.html), false)
        };

        Ok(Prepared {
            html,
            max_pages,
            density_reduced,
        })
    }

    fn fit_document<O: RenderingOracle>(
        &self,
        oracle: &mut O,
        prepared: &Prepared,
    ) -> Result<FitResult> {
        let natural = oracle.measure(1.0)?;
        // An empty body still counts as one pixel so the request stays valid.
        let request = FitRequest::new(
            natural.max(1.0),
            self.config.per_page_capacity_px(),
            prepared.max_pages,
        )
        .with_density_reduced(prepared.density_reduced);

        // Scale 1 is already measured; at most 1 + max_probes layout passes.
        let mut cached = Some(natural);
        let result = self.solver.fit(&request, |scale| {
            if scale == 1.0 {
                if let Some(height) = cached.take() {
                    return Ok(height);
                }
            }
            oracle.measure(scale)
        })?;
        tracing::debug!(
            natural = result.natural_height_px,
            final_scale = result.final_scale,
            fits = result.fits,
            probes = result.probes(),
            "fit complete"
        );
        Ok(result)
    }

    fn store(&self, base_name: &str, job_id: &str, pdf: &[u8]) -> Result<PathBuf> {
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir)?;
        let path = stored_file_path(dir, base_name, job_id);
        std::fs::write(&path, pdf)?;
        Ok(path)
    }
}

struct Prepared {
    html: Arc<str>,
    max_pages: u32,
    density_reduced: bool,
}

/// Short random id naming one conversion
pub fn new_job_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// `<dir>/<base_name>-<job_id>.pdf`
pub fn stored_file_path(dir: &Path, base_name: &str, job_id: &str) -> PathBuf {
    dir.join(format!("{}-{}.pdf", base_name, job_id))
}
