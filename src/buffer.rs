use image::RgbaImage;

use crate::errors::{Result, SegError};

/// Interleaved R,G,B,A samples, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// One intensity byte per pixel, `width * height` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

pub(crate) fn expected_len(width: u32, height: u32, channels: usize) -> usize {
    width as usize * height as usize * channels
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, 4);
        if data.len() != expected {
            return Err(SegError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_pixel(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(expected_len(width, height, 4))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ])
    }

    /// Builds an `RgbaImage` writing each pixel in R,G,B,A order.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let idx = (y as usize * self.width as usize + x as usize) * 4;
            image::Rgba([
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ])
        })
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity(expected_len(width, height, 4));
        for image::Rgba([r, g, b, a]) in img.pixels() {
            data.extend_from_slice(&[*r, *g, *b, *a]);
        }
        Self {
            width,
            height,
            data,
        }
    }
}

impl MaskBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, 1);
        if data.len() != expected {
            return Err(SegError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Expands the mask into an opaque grayscale image (R=G=B=v, A=255).
    pub fn to_pixels(&self) -> PixelBuffer {
        let data = self.data.iter().flat_map(|&v| [v, v, v, 255]).collect();
        PixelBuffer {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_length_invariant() {
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            SegError::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_mask_buffer_length_invariant() {
        assert!(MaskBuffer::new(3, 2, vec![0; 6]).is_ok());
        assert!(MaskBuffer::new(3, 2, vec![0; 24]).is_err());
    }

    #[test]
    fn test_mask_expansion() {
        let mask = MaskBuffer::new(2, 1, vec![0, 200]).unwrap();
        let pixels = mask.to_pixels();
        assert_eq!(pixels.dimensions(), (2, 1));
        assert_eq!(pixels.as_bytes(), &[0, 0, 0, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_channel_order_through_image() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let buffer = PixelBuffer::new(1, 2, data.clone()).unwrap();
        let img = buffer.to_rgba_image();
        assert_eq!(img.get_pixel(0, 1).0, [5, 6, 7, 8]);
        assert_eq!(PixelBuffer::from_rgba_image(&img).as_bytes(), &data[..]);
    }

    #[test]
    fn test_pixel_lookup() {
        let buffer = PixelBuffer::from_pixel(3, 3, [9, 8, 7, 6]);
        assert_eq!(buffer.pixel(2, 2), Some([9, 8, 7, 6]));
        assert_eq!(buffer.pixel(3, 0), None);
    }
}
