//! Default payload decoding

use crate::types::Image;

/// Turns a complete payload into an image
///
/// The downloader applies its decoder to every task that does not carry its
/// own decoding handler. Implementations run on the processing pool and may
/// block.
pub trait ImageDecoder: Send + Sync {
    /// Decode `data`, returning `None` when it is not a supported image
    fn decode(&self, data: &[u8]) -> Option<Image>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Decoder backed by the `image` crate's format sniffing
///
/// Supports the formats compiled into the `image` dependency (JPEG, PNG, GIF,
/// WebP).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecoder;

impl ImageDecoder for DefaultDecoder {
    fn decode(&self, data: &[u8]) -> Option<Image> {
        match image::load_from_memory(data) {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(len = data.len(), error = %e, "Default decoder rejected payload");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "image"
    }
}
