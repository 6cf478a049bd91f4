//! Reassembly and decoding of the embedded PDF payload.

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::{PipelineError, Result};

/// Marker the sending system puts in front of the encoded document.
pub const PDF_MARKER: &str = "^^PDF^Base64^";

const PDF_MAGIC: &[u8] = b"%PDF";

/// Standard alphabet that tolerates non-zero bits in the last symbol, which
/// is what a payload cut off mid-quantum looks like once padded.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Strip the marker and line endings, then pad to a multiple of four.
pub fn normalize(encoded: &str) -> String {
    let mut cleaned: String = encoded
        .replace(PDF_MARKER, "")
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();

    let remainder = cleaned.len() % 4;
    if remainder != 0 {
        cleaned.extend(std::iter::repeat('=').take(4 - remainder));
    }
    cleaned
}

/// Decode the accumulated payload into document bytes.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    if encoded.is_empty() {
        return Err(PipelineError::NoPayload);
    }

    let normalized = normalize(encoded);
    let bytes = PAYLOAD_ENGINE
        .decode(normalized.as_bytes())
        .map_err(|e| PipelineError::DecodeFailed(e.to_string()))?;

    if !bytes.starts_with(PDF_MAGIC) {
        log::warn!("Decoded payload does not look like a PDF ({} bytes)", bytes.len());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;

    #[test]
    fn test_empty_payload_is_no_payload() {
        assert!(matches!(decode(""), Err(PipelineError::NoPayload)));
    }

    #[test]
    fn test_marker_and_line_endings_removed() {
        assert_eq!(normalize("^^PDF^Base64^QUJD\r\nREVG"), "QUJDREVG");
        assert_eq!(decode("^^PDF^Base64^QUJD\r\nREVG").unwrap(), b"ABCDEF");
    }

    #[test]
    fn test_marker_removed_from_every_fragment() {
        let joined = format!("{PDF_MARKER}QUJD{PDF_MARKER}REVG");
        assert_eq!(decode(&joined).unwrap(), b"ABCDEF");
    }

    #[test]
    fn test_paddable_length_classes_decode() {
        // 4k
        assert_eq!(decode("QUJD").unwrap(), b"ABC");
        // 4k+2
        assert_eq!(normalize("QQ"), "QQ==");
        assert_eq!(decode("QQ").unwrap(), b"A");
        // 4k+3
        assert_eq!(normalize("QUI"), "QUI=");
        assert_eq!(decode("QUI").unwrap(), b"AB");
    }

    #[test]
    fn test_truncated_payload_with_trailing_bits_decodes() {
        // 4k+2: "QUJDRB" -> "QUJDRB==", last symbol carries stray bits
        assert_eq!(decode("QUJDRB").unwrap(), b"ABCD");
        // 4k+3
        assert_eq!(decode("QUJDREW").unwrap(), b"ABCDE");
    }

    #[test]
    fn test_length_4k_plus_1_is_rejected() {
        assert_eq!(normalize("QUJDR"), "QUJDR===");
        assert!(matches!(decode("QUJDR"), Err(PipelineError::DecodeFailed(_))));
    }

    #[test]
    fn test_bad_alphabet_is_rejected() {
        assert!(matches!(decode("QU*D"), Err(PipelineError::DecodeFailed(_))));
    }

    #[test]
    fn test_pdf_bytes_roundtrip() {
        let pdf = b"%PDF-1.4\n%%EOF\n";
        let encoded = BASE64_STANDARD.encode(pdf);
        let trimmed = encoded.trim_end_matches('=');
        assert_eq!(decode(trimmed).unwrap(), pdf);
    }
}
