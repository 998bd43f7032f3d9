//! Application server key encoding.
//!
//! Browsers hand out and accept the VAPID public key ("application server
//! key") as unpadded base64url. Push subscriptions need the raw bytes, so the
//! key is decoded once and kept in binary form from then on.

use base64::{
    alphabet,
    engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD as BASE64URL},
    Engine,
};

/// Standard alphabet, ignoring non-zero bits after the last full byte the way
/// browsers' `atob` does.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// The supplied key is not valid base64url.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed application server key: {0}")]
pub struct MalformedKey(pub String);

/// Decode a base64url application server key into raw bytes.
///
/// Pads the input with `=` to a multiple of four characters and swaps the
/// URL-safe alphabet (`-`, `_`) for the standard one (`+`, `/`) before
/// decoding, so both padded and unpadded input is accepted. Stray bits in
/// the final character are ignored.
pub fn decode_application_server_key(base64_key: &str) -> Result<Vec<u8>, MalformedKey> {
    let padding = "=".repeat((4 - base64_key.len() % 4) % 4);
    let standard: String = format!("{base64_key}{padding}")
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    LENIENT_STANDARD
        .decode(standard.as_bytes())
        .map_err(|e| MalformedKey(e.to_string()))
}

/// Encode raw key bytes as unpadded base64url.
///
/// Inverse of [`decode_application_server_key`].
pub fn encode_application_server_key(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}
