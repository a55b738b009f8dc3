//! Integration tests for the fit solver and the conversion pipeline
//!
//! Rendering is replaced by a stub backend with a deterministic height model
//! that prints real (empty-page) PDFs, so qpdf post-processing runs for real.

use html_fit_pdf::convert::{ConvertConfig, ConvertRequest, Converter};
use html_fit_pdf::density::is_density_reduced;
use html_fit_pdf::fit::{fit, FitParams, FitRequest, FitSolver};
use html_fit_pdf::pdf::QpdfWrapper;
use html_fit_pdf::render::{PageSetup, RenderBackend, RenderingOracle};
use html_fit_pdf::{Error, Result};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

/// Build a PDF with `pages` blank letter pages
fn blank_pdf(pages: usize) -> Vec<u8> {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages
        ),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string());
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

#[derive(Debug, Clone, Copy)]
enum Layout {
    /// Height shrinks proportionally with scale
    Linear(f64),
    /// Height ignores scale
    Rigid(f64),
    /// Every measurement fails
    Broken,
}

impl Layout {
    fn height(&self, scale: f64) -> Result<f64> {
        match *self {
            Layout::Linear(natural) => Ok(natural * scale),
            Layout::Rigid(natural) => Ok(natural),
            Layout::Broken => Err(Error::Render {
                reason: "renderer crashed".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct Log {
    opened: Vec<String>,
    measured: Vec<f64>,
    printed_at: Vec<f64>,
}

struct StubBackend {
    layout: Layout,
    capacity: f64,
    log: Arc<Mutex<Log>>,
}

struct StubOracle {
    layout: Layout,
    capacity: f64,
    scale: f64,
    log: Arc<Mutex<Log>>,
}

impl RenderBackend for StubBackend {
    type Oracle = StubOracle;

    fn open(&self, html: &str, _job_id: &str) -> Result<StubOracle> {
        self.log.lock().opened.push(html.to_string());
        Ok(StubOracle {
            layout: self.layout,
            capacity: self.capacity,
            scale: 1.0,
            log: Arc::clone(&self.log),
        })
    }
}

impl RenderingOracle for StubOracle {
    fn measure(&mut self, scale: f64) -> Result<f64> {
        self.log.lock().measured.push(scale);
        self.scale = scale;
        self.layout.height(scale)
    }

    fn print_pdf(&mut self, _page: &PageSetup) -> Result<Vec<u8>> {
        self.log.lock().printed_at.push(self.scale);
        let height = self.layout.height(self.scale)?;
        let pages = (height / self.capacity).ceil().max(1.0) as usize;
        Ok(blank_pdf(pages))
    }
}

struct Harness {
    converter: Converter<StubBackend>,
    log: Arc<Mutex<Log>>,
    _dir: tempfile::TempDir,
}

fn harness(layout: Layout, capacity: f64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let config = ConvertConfig {
        output_dir: dir.path().join("generated"),
        per_page_capacity_px: Some(capacity),
        ..ConvertConfig::default()
    };
    let backend = StubBackend {
        layout,
        capacity,
        log: Arc::clone(&log),
    };
    Harness {
        converter: Converter::with_backend(backend, config).unwrap(),
        log,
        _dir: dir,
    }
}

const PAGE: &str = "<html><head><title>cv</title></head><body><p>Experience</p></body></html>";

// ============================================================================
// Solver
// ============================================================================

#[rstest]
#[case::fits_naturally(Layout::Linear(1800.0), 1000.0, 2, 1.0, true, 0)]
#[case::one_probe(Layout::Linear(1200.0), 490.0, 2, 980.0 / 1200.0, true, 1)]
#[case::rigid_content(Layout::Rigid(1960.0), 490.0, 2, 0.25, false, 2)]
#[case::floor_reached(Layout::Linear(10000.0), 490.0, 2, 0.25, false, 1)]
fn test_solver_scenarios(
    #[case] layout: Layout,
    #[case] capacity: f64,
    #[case] max_pages: u32,
    #[case] expected_scale: f64,
    #[case] expected_fits: bool,
    #[case] expected_probes: usize,
) {
    let request = FitRequest::new(layout.height(1.0).unwrap(), capacity, max_pages);
    let result = fit(&request, |scale: f64| layout.height(scale)).unwrap();

    assert!((result.final_scale - expected_scale).abs() < 1e-9);
    assert_eq!(result.fits, expected_fits);
    assert_eq!(result.probes(), expected_probes);
    assert_eq!(result.limit, capacity * f64::from(max_pages));
}

#[rstest]
#[case(1500.0)]
#[case(2500.0)]
#[case(4000.0)]
#[case(9000.0)]
fn test_solver_properties(#[case] natural: f64) {
    let solver = FitSolver::new(FitParams::default()).unwrap();
    let request = FitRequest::new(natural, 1000.0, 1);
    let mut calls = 0;

    // Content that only partially reflows when shrunk.
    let result = solver
        .fit(&request, |scale: f64| {
            calls += 1;
            Ok(natural * scale.sqrt())
        })
        .unwrap();

    assert!(calls <= 3);
    assert!(result.final_scale >= 0.25 && result.final_scale <= 1.0);
    for pair in result.attempts.windows(2) {
        assert!(pair[1].scale < pair[0].scale);
    }
    if result.fits {
        assert!(result.final_height_px <= result.limit);
    } else {
        assert!(result.final_height_px > result.limit);
    }
    assert_eq!(
        result.estimated_pages,
        (result.final_height_px / 1000.0 * 100.0).round() / 100.0
    );
}

// ============================================================================
// Conversion pipeline
// ============================================================================

#[tokio::test]
async fn test_convert_shrinks_to_budget() {
    let h = harness(Layout::Linear(1200.0), 490.0);

    let output = h
        .converter
        .convert(ConvertRequest::new(PAGE, "resume"))
        .await
        .unwrap();

    let fit = output.fit.unwrap();
    assert!(fit.fits);
    assert_eq!(fit.final_height_px, 980.0);
    assert_eq!(fit.natural_height_px, 1200.0);
    assert_eq!(output.page_count, Some(2));
    assert_eq!(output.max_pages, 2);

    let log = h.log.lock();
    assert_eq!(log.opened.len(), 1);
    assert_eq!(log.printed_at, vec![fit.final_scale]);

    let stored = output.stored_path.unwrap();
    let name = stored.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(name, format!("resume-{}.pdf", output.job_id));
    assert_eq!(std::fs::read(&stored).unwrap(), output.pdf);
}

#[tokio::test]
async fn test_convert_leaves_fitting_content_alone() {
    let h = harness(Layout::Linear(900.0), 1000.0);
    let request = ConvertRequest {
        max_pages: Some(1),
        ..ConvertRequest::new(PAGE, "short")
    };

    let output = h.converter.convert(request).await.unwrap();
    let fit = output.fit.unwrap();

    assert_eq!(fit.final_scale, 1.0);
    assert!(fit.attempts.is_empty());
    assert_eq!(fit.estimated_pages, 0.9);
    assert_eq!(output.page_count, Some(1));
    assert_eq!(h.log.lock().printed_at, vec![1.0]);
}

#[tokio::test]
async fn test_convert_reports_overflow_without_failing() {
    let h = harness(Layout::Rigid(1960.0), 490.0);

    let output = h
        .converter
        .convert(ConvertRequest::new(PAGE, "long"))
        .await
        .unwrap();
    let fit = output.fit.unwrap();

    assert!(!fit.fits);
    assert_eq!(fit.final_scale, 0.25);
    assert_eq!(fit.estimated_pages, 4.0);
    assert_eq!(output.page_count, Some(4));
    assert!(output.stored_path.is_some());
}

#[rstest]
#[case::rigid(Layout::Rigid(1960.0), 980.0, 1, vec![1.0, 0.5, 0.25])]
#[case::linear(Layout::Linear(1200.0), 490.0, 2, vec![1.0, 980.0 / 1200.0])]
#[case::fits(Layout::Linear(900.0), 1000.0, 1, vec![1.0])]
fn test_convert_measures_at_most_three_times(
    #[case] layout: Layout,
    #[case] capacity: f64,
    #[case] max_pages: u32,
    #[case] expected: Vec<f64>,
) {
    let h = harness(layout, capacity);
    let request = ConvertRequest {
        max_pages: Some(max_pages),
        ..ConvertRequest::new(PAGE, "budget")
    };

    h.converter.convert_blocking(request).unwrap();

    let log = h.log.lock();
    assert!(log.measured.len() <= 3);
    assert_eq!(log.measured, expected);
}

#[tokio::test]
async fn test_analyze_measures_at_most_three_times() {
    let h = harness(Layout::Rigid(1960.0), 490.0);

    let fit = h
        .converter
        .analyze(ConvertRequest::new(PAGE, "budget"))
        .await
        .unwrap();

    assert_eq!(fit.probes(), 2);
    assert_eq!(h.log.lock().measured, vec![1.0, 0.5, 0.25]);
}

#[tokio::test]
async fn test_convert_without_fit_prints_natural_size() {
    let h = harness(Layout::Linear(3000.0), 1000.0);
    let request = ConvertRequest {
        fit: Some(false),
        ..ConvertRequest::new(PAGE, "natural")
    };

    let output = h.converter.convert(request).await.unwrap();

    assert!(output.fit.is_none());
    assert_eq!(output.page_count, Some(3));
    let log = h.log.lock();
    assert!(log.measured.is_empty());
    assert_eq!(log.printed_at, vec![1.0]);
}

#[tokio::test]
async fn test_zero_page_budget_rejected_before_rendering() {
    let h = harness(Layout::Linear(1200.0), 490.0);
    let request = ConvertRequest {
        max_pages: Some(0),
        ..ConvertRequest::new(PAGE, "zero")
    };

    let result = h.converter.convert(request).await;

    assert!(matches!(result, Err(Error::InvalidInput { .. })));
    assert!(h.log.lock().opened.is_empty());
}

#[tokio::test]
async fn test_render_failure_propagates_and_stores_nothing() {
    let h = harness(Layout::Broken, 490.0);
    let output_dir = h.converter.config().output_dir.clone();

    let result = h
        .converter
        .convert(ConvertRequest::new(PAGE, "broken"))
        .await;

    assert!(matches!(result, Err(Error::Render { .. })));
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn test_density_reduction_reaches_renderer() {
    let h = harness(Layout::Linear(1200.0), 490.0);
    let request = ConvertRequest {
        density_reduction: true,
        ..ConvertRequest::new(PAGE, "dense")
    };

    let output = h.converter.convert(request).await.unwrap();

    assert!(output.density_reduced);
    assert!(output.fit.unwrap().density_reduced);
    let log = h.log.lock();
    assert!(is_density_reduced(&log.opened[0]));
    assert!(!is_density_reduced(PAGE));
}

#[tokio::test]
async fn test_optimize_keeps_page_count() {
    let h = harness(Layout::Linear(2400.0), 1000.0);
    let request = ConvertRequest {
        optimize: true,
        fit: Some(false),
        persist: false,
        ..ConvertRequest::new(PAGE, "optimized")
    };

    let output = h.converter.convert(request).await.unwrap();

    assert_eq!(output.page_count, Some(3));
    assert_eq!(QpdfWrapper::page_count(&output.pdf).unwrap(), 3);
    assert!(output.stored_path.is_none());
}

#[tokio::test]
async fn test_analyze_does_not_print_or_store() {
    let h = harness(Layout::Linear(1200.0), 490.0);
    let output_dir = h.converter.config().output_dir.clone();

    let fit = h
        .converter
        .analyze(ConvertRequest::new(PAGE, "analyzed"))
        .await
        .unwrap();

    assert!(fit.fits);
    assert_eq!(fit.probes(), 1);
    assert!(h.log.lock().printed_at.is_empty());
    assert!(!output_dir.exists());
}

#[test]
fn test_blank_pdf_is_readable() {
    assert_eq!(QpdfWrapper::page_count(&blank_pdf(2)).unwrap(), 2);
}
