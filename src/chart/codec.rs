//! Reversible text to URL-safe token encoding.
//!
//! Diagram sources are embedded in the fragment of a share link. The token
//! is the standard base64 encoding of the UTF-8 bytes with `+` and `/`
//! swapped for `-` and `_` and the `=` padding stripped, so it only ever
//! contains `[A-Za-z0-9_-]`.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

use crate::error::DecodeError;

/// Encodes diagram text into a URL-safe token.
///
/// Encoding is total: every string has a token, and the empty string maps to
/// the empty token.
#[must_use]
pub fn encode(text: &str) -> String {
    let mut token = BASE64_STANDARD.encode(text.as_bytes());
    let unpadded = token.trim_end_matches('=').len();
    token.truncate(unpadded);

    token
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Decodes a token produced by [`encode`] back into the original text.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidBase64`] if the token is not valid base64
/// once the URL-safe substitutions are reversed, and
/// [`DecodeError::InvalidUtf8`] if the decoded bytes are not UTF-8.
pub fn decode(token: &str) -> Result<String, DecodeError> {
    let mut base64: String = token
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    while base64.len() % 4 != 0 {
        base64.push('=');
    }

    let bytes = BASE64_STANDARD
        .decode(base64.as_bytes())
        .map_err(|source| DecodeError::InvalidBase64 { source })?;

    String::from_utf8(bytes).map_err(|source| DecodeError::InvalidUtf8 { source })
}
