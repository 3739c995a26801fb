//! Decoding of `data:` URLs produced by the browser signature pad.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::StampError;

/// Upper bound on the encoded payload, well above any canvas export.
const MAX_ENCODED_LEN: usize = 4 * 1024 * 1024;

/// Decode a `data:image/<type>;base64,<payload>` URL into raw image bytes.
///
/// Whitespace inside the payload is ignored, since some clients wrap long
/// lines.
///
/// # Errors
///
/// Returns [`StampError::InvalidDataUrl`] if the header is missing or not a
/// base64 image, or the payload is empty, oversized, or not valid base64.
pub fn decode_signature(data_url: &str) -> Result<Vec<u8>, StampError> {
    let (header, payload) = data_url
        .trim()
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator"))?;

    let media = header
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing 'data:' scheme"))?;
    let media_type = media
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("payload is not base64 encoded"))?;
    if !media_type.starts_with("image/") {
        return Err(invalid(&format!("unsupported media type '{media_type}'")));
    }

    if payload.len() > MAX_ENCODED_LEN {
        return Err(invalid("payload too large"));
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(invalid("empty payload"));
    }

    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| invalid(&e.to_string()))
}

fn invalid(reason: &str) -> StampError {
    StampError::InvalidDataUrl {
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_payload() {
        let bytes = decode_signature("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(bytes, b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn tolerates_wrapped_payload() {
        let bytes = decode_signature("data:image/png;base64,iVBO\nRw0K\r\nGgo=").unwrap();
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn rejects_missing_comma() {
        let err = decode_signature("data:image/png;base64").unwrap_err();
        assert!(matches!(err, StampError::InvalidDataUrl { .. }));
    }

    #[test]
    fn rejects_non_image_media() {
        assert!(decode_signature("data:text/plain;base64,aGVsbG8=").is_err());
    }

    #[test]
    fn rejects_plain_encoding() {
        assert!(decode_signature("data:image/svg+xml,<svg/>").is_err());
    }

    #[test]
    fn rejects_empty_and_garbage_payloads() {
        assert!(decode_signature("data:image/png;base64,").is_err());
        assert!(decode_signature("data:image/png;base64,!!!").is_err());
    }
}
