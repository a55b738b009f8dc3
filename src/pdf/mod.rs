//! PDF post-processing layer

mod qpdf;

pub use qpdf::{has_pdf_header, QpdfWrapper};
