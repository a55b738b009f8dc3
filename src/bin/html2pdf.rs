//! html2pdf - convert one HTML file to a PDF that fits a page budget

use anyhow::Context;
use clap::Parser;
use html_fit_pdf::convert::{ConvertRequest, Converter};
use html_fit_pdf::render::{Margins, PaperFormat};
use html_fit_pdf::source::resolve_path;
use html_fit_pdf::ServerConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Margins used when --margin-mm is not given: 5mm top/bottom, no side margins
const DEFAULT_MARGINS: &str = "5,0,5,0";

#[derive(Parser, Debug)]
#[command(name = "html2pdf", version, about = "Convert HTML to a PDF scaled to fit a page budget")]
struct Args {
    /// HTML file to convert
    #[arg(default_value = "index.html")]
    input: PathBuf,

    /// Output PDF path (default: generated/<input stem>.pdf)
    output: Option<PathBuf>,

    /// Page budget (default: MAX_PAGES or 2)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Print at natural size without fitting
    #[arg(long)]
    no_fit: bool,

    /// Tighten typography and lay text out in columns before fitting
    #[arg(long)]
    density: bool,

    /// Paper format: letter, a4 or legal
    #[arg(long, value_parser = parse_paper)]
    paper: Option<PaperFormat>,

    /// Margins in millimetres, either one value or T,R,B,L
    #[arg(long, value_parser = parse_margins, default_value = DEFAULT_MARGINS)]
    margin_mm: Margins,

    /// Chrome/Chromium executable (default: CHROMIUM_PATH or auto-detect)
    #[arg(long)]
    chrome: Option<PathBuf>,
}

fn parse_paper(s: &str) -> Result<PaperFormat, String> {
    s.parse().map_err(|e: html_fit_pdf::Error| e.to_string())
}

fn parse_margins(s: &str) -> Result<Margins, String> {
    Margins::parse(s).map_err(|e| e.to_string())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    Path::new("generated").join(format!("{}.pdf", stem))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "html_fit_pdf=info,html2pdf=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::from_env()?.convert;
    config.page.margins = args.margin_mm;
    if let Some(paper) = args.paper {
        config.page.paper = paper;
    }
    if let Some(chrome) = args.chrome {
        config.render.chrome_path = Some(chrome);
    }
    if args.no_fit {
        config.fit_enabled = false;
    }

    let resolved = resolve_path(&args.input, u64::MAX)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let output = args.output.unwrap_or_else(|| default_output(&args.input));

    let converter = Converter::chrome(config)?;
    let request = ConvertRequest {
        max_pages: args.max_pages,
        density_reduction: args.density,
        persist: false,
        ..ConvertRequest::new(resolved.html, resolved.base_name)
    };
    let result = converter.convert(request).await?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&output, &result.pdf)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!("Wrote {}", output.display());
    match &result.fit {
        Some(fit) => println!(
            "scale {:.2}, estimated pages {:.2} of {}{}",
            fit.final_scale,
            fit.estimated_pages,
            result.max_pages,
            if fit.fits { "" } else { " (does not fit)" }
        ),
        None => println!("fit disabled, printed at natural size"),
    }
    if let Some(pages) = result.page_count {
        println!("{} page(s)", pages);
    }

    Ok(())
}
