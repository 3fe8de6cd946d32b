use crate::Resolution;

/// Borrowed 8-bit grayscale frame handed to marker detectors.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    /// Pixel resolution of this frame.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width as u32,
            height: self.height as u32,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}
