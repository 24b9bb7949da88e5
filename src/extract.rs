//! PDF text extraction.
//!
//! Reads a PDF from disk and returns its text, page by page, via
//! `pdf-extract`. The parser is known to panic on some malformed inputs, so
//! it runs under [`std::panic::catch_unwind`] and a panic becomes an
//! ordinary [`ExtractionError::Parse`].

use std::fs::File;
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use socratic_tutor_core::error::ExtractionError;

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// All page texts concatenated in page order.
///
/// A single `'\n'` is inserted between pages only when the previous page
/// does not already end in whitespace, so words on either side of a page
/// break never fuse.
pub fn extract_pdf_text(path: &Path) -> Result<String, ExtractionError> {
    let pages = extract_pdf_pages(path)?;
    Ok(join_pages(&pages))
}

/// Text of each page, in page order.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>, ExtractionError> {
    let bytes = read_pdf(path)?;

    let result = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractionError::Parse(e.to_string())),
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "parser panicked".to_string()
            };
            Err(ExtractionError::Parse(message))
        }
    }
}

/// Read the whole file, rejecting anything without the PDF signature.
/// The handle is dropped before parsing starts.
fn read_pdf(path: &Path) -> Result<Vec<u8>, ExtractionError> {
    let open_err = |e: std::io::Error| ExtractionError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut bytes = Vec::new();
    {
        let mut file = File::open(path).map_err(open_err)?;
        file.read_to_end(&mut bytes).map_err(open_err)?;
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractionError::NotPdf(path.display().to_string()));
    }
    Ok(bytes)
}

pub fn join_pages(pages: &[String]) -> String {
    let mut text = String::with_capacity(pages.iter().map(|p| p.len() + 1).sum());
    for page in pages {
        if !text.is_empty() && !text.ends_with(char::is_whitespace) {
            text.push('\n');
        }
        text.push_str(page);
    }
    text
}
