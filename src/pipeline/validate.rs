//! Upload validation: reject anything that is not a non-empty, small PDF
//! before it touches the disk or the network.

use crate::error::FileError;
use crate::model::UploadedFile;
use tracing::debug;

/// The only content type accepted at the boundary.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Check an upload and return its size in KB (`round(bytes/1024, 2)`).
///
/// Fails when the file is empty, when its declared content type is not
/// `application/pdf` (ASCII case-insensitive), or when it exceeds
/// `max_file_kb`.
pub fn validate_pdf(file: &UploadedFile, max_file_kb: f64) -> Result<f64, FileError> {
    if file.bytes.is_empty() {
        return Err(FileError::Validation("PDF file missing or empty".into()));
    }

    let declared = file.content_type.as_deref().unwrap_or("");
    if !declared.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
        let received = file.content_type.as_deref().unwrap_or("<none>");
        return Err(FileError::Validation(format!(
            "Only PDF files allowed. Received: {received}"
        )));
    }

    let size_kb = file.size_kb();
    if size_kb > max_file_kb {
        return Err(FileError::Validation(format!(
            "File {} exceeded size limit ({size_kb} KB)\nRequired Limit : {max_file_kb} KB",
            file.file_name
        )));
    }

    debug!("Validated '{}' ({} KB)", file.file_name, size_kb);
    Ok(size_kb)
}

/// Guess a content type from the first bytes of a file.
///
/// Used by front-ends that read files from disk and have no declared type.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        PDF_CONTENT_TYPE
    } else {
        "application/octet-stream"
    }
}
