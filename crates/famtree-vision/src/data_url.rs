//! `data:<media type>;base64,<payload>` URLs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("image must be a data URL")]
    NotDataUrl,
    #[error("data URL is not base64-encoded")]
    NotBase64,
    #[error("data URL has no payload")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Decode(String),
}

/// Decoded data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Declared media type, without parameters. May be empty.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Strip the `data:...;base64,` prefix and decode the payload.
pub fn decode_data_url(input: &str) -> Result<DataUrl, DataUrlError> {
    let rest = input
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUrlError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;
    let params = header.strip_suffix(";base64").ok_or(DataUrlError::NotBase64)?;
    let media_type = params.split(';').next().unwrap_or_default().to_string();

    if payload.is_empty() {
        return Err(DataUrlError::Empty);
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| DataUrlError::Decode(e.to_string()))?;

    Ok(DataUrl { media_type, bytes })
}

pub fn encode_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(bytes))
}
