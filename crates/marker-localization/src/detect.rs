//! Frame decoding in front of a grayscale marker detector.

use crate::core::{GrayImageView, ImageAnnotations};
use crate::service::{DetectorConfig, GrayMarkerDetector, Image, MarkerDetector};
use log::warn;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced while turning frame bytes into a detector input.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("empty frame")]
    EmptyFrame,

    #[error(transparent)]
    Decode(#[from] ::image::ImageError),
}

/// Decode encoded frame bytes (any format `image` recognizes) to 8-bit gray.
pub fn decode_gray(bytes: &[u8]) -> Result<::image::GrayImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::EmptyFrame);
    }
    Ok(::image::load_from_memory(bytes)?.to_luma8())
}

/// Borrow an `image::GrayImage` as the core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// [`MarkerDetector`] that decodes the frame and delegates to a grayscale detector.
///
/// Undecodable frames yield zero detections with a zero resolution.
#[derive(Clone, Debug)]
pub struct DecodingDetector<G> {
    inner: G,
}

impl<G: GrayMarkerDetector> DecodingDetector<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

impl<G: GrayMarkerDetector> MarkerDetector for DecodingDetector<G> {
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip_all,
            fields(bytes = image.data.len(), dictionary = config.dictionary)
        )
    )]
    fn detect(&self, image: &Image, config: &DetectorConfig) -> ImageAnnotations {
        let gray = match decode_gray(&image.data) {
            Ok(gray) => gray,
            Err(err) => {
                warn!("event=Detector.DecodeFailed bytes={} err={err}", image.data.len());
                return ImageAnnotations::default();
            }
        };
        let view = gray_view(&gray);
        ImageAnnotations {
            objects: self.inner.detect_gray(&view, config),
            resolution: view.resolution(),
        }
    }
}
