//! qpdf post-processing of printed PDFs
//!
//! Chrome's output is counted and, on request, rewritten with compressed
//! object streams using the qpdf crate (vendored FFI).

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Post-processing helpers over qpdf
pub struct QpdfWrapper;

fn open_qpdf(data: &[u8]) -> Result<QPdf> {
    if !has_pdf_header(data) {
        return Err(Error::Pdf {
            reason: "renderer output is not a PDF".to_string(),
        });
    }
    QPdf::read_from_memory(data).map_err(map_qpdf_error)
}

fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    Error::Pdf {
        reason: e.to_string(),
    }
}

/// Whether `data` starts with the `%PDF` magic
pub fn has_pdf_header(data: &[u8]) -> bool {
    data.len() >= 4 && &data[0..4] == b"%PDF"
}

impl QpdfWrapper {
    /// Number of pages in a PDF
    pub fn page_count(data: &[u8]) -> Result<u32> {
        let qpdf = open_qpdf(data)?;
        qpdf.get_num_pages().map_err(map_qpdf_error)
    }

    /// Rewrite a PDF with compressed streams and generated object streams,
    /// dropping unreferenced objects.
    pub fn optimize(data: &[u8]) -> Result<Vec<u8>> {
        let qpdf = open_qpdf(data)?;

        let mut writer = qpdf.writer();
        writer
            .object_stream_mode(ObjectStreamMode::Generate)
            .compress_streams(true)
            .preserve_unreferenced_objects(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }
}
