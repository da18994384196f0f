//! famtree-vision — Remote face detection.
//!
//! Talks to the Cloud Vision `images:annotate` endpoint and converts the
//! browser-style data URLs clients send into raw image bytes.

pub mod data_url;
pub mod sniff;
pub mod vision;

pub use data_url::{decode_data_url, encode_data_url, DataUrl, DataUrlError};
pub use vision::{VisionClient, VisionConfig, VisionError};
