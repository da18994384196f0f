//! Image format detection from magic bytes.

use image::ImageFormat;

pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// MIME type of the encoded image, or `application/octet-stream`.
pub fn mime_type(bytes: &[u8]) -> &'static str {
    sniff_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Give `file_name` an extension matching the image when it has none.
pub fn with_extension(file_name: &str, bytes: &[u8]) -> String {
    if file_name.rsplit_once('.').is_some_and(|(_, ext)| !ext.is_empty()) {
        return file_name.to_string();
    }
    match sniff_format(bytes).and_then(|f| f.extensions_str().first().copied()) {
        Some(ext) => format!("{file_name}.{ext}"),
        None => file_name.to_string(),
    }
}
