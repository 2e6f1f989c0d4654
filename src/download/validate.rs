//! Content validation gate for candidate PDFs.
//!
//! A payload is accepted only when it is larger than [`MIN_PDF_BYTES`] and
//! starts with the `%PDF` signature. Nothing else about the document is
//! inspected.

use thiserror::Error;

/// Payloads of this size or smaller are rejected.
pub const MIN_PDF_BYTES: usize = 5000;

/// Magic bytes every PDF starts with.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload too small to be a real article.
    #[error("payload too small ({size} bytes, need more than {MIN_PDF_BYTES})")]
    TooSmall {
        /// Observed payload size.
        size: usize,
    },

    /// Payload does not start with `%PDF`.
    #[error("payload does not start with the PDF signature")]
    BadSignature,
}

/// Checks that `bytes` look like a real PDF.
///
/// ```
/// use paperfetch_core::download::{ValidationError, validate_pdf};
///
/// let mut pdf = b"%PDF-1.7\n".to_vec();
/// pdf.resize(6000, b' ');
/// assert!(validate_pdf(&pdf).is_ok());
/// assert_eq!(validate_pdf(b"%PDF"), Err(ValidationError::TooSmall { size: 4 }));
/// ```
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first failed check; size is
/// checked before the signature.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.len() <= MIN_PDF_BYTES {
        return Err(ValidationError::TooSmall { size: bytes.len() });
    }
    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(ValidationError::BadSignature);
    }
    Ok(())
}

/// Boolean form of [`validate_pdf`].
#[must_use]
pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    validate_pdf(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8], len: usize) -> Vec<u8> {
        let mut bytes = prefix.to_vec();
        bytes.resize(len, b'0');
        bytes
    }

    #[test]
    fn test_accepts_pdf_just_over_threshold() {
        assert!(is_valid_pdf(&padded(b"%PDF-1.4", MIN_PDF_BYTES + 1)));
    }

    #[test]
    fn test_rejects_pdf_at_threshold() {
        assert_eq!(
            validate_pdf(&padded(b"%PDF-1.4", MIN_PDF_BYTES)),
            Err(ValidationError::TooSmall {
                size: MIN_PDF_BYTES
            })
        );
    }

    #[test]
    fn test_rejects_html_of_any_size() {
        assert_eq!(
            validate_pdf(&padded(b"<!DOCTYPE html>", 50_000)),
            Err(ValidationError::BadSignature)
        );
    }

    #[test]
    fn test_rejects_empty_payload() {
        assert_eq!(
            validate_pdf(&[]),
            Err(ValidationError::TooSmall { size: 0 })
        );
    }

    #[test]
    fn test_signature_is_case_sensitive() {
        assert_eq!(
            validate_pdf(&padded(b"%pdf-1.4", 6000)),
            Err(ValidationError::BadSignature)
        );
    }
}
