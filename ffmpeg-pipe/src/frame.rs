//! rgb24 raw video: one byte per channel, row-major, no padding.

use image::{GenericImageView, Pixel, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Builds an opaque RGBA image from one rgb24 frame. `data` must hold
/// exactly `3 * width * height` bytes.
pub fn decode(data: &[u8], width: u32, height: u32) -> Result<RgbaImage> {
    let expected = 3 * width as usize * height as usize;
    if data.len() != expected {
        return Err(Error::UnexpectedEndOfStream);
    }
    let mut rgba = Vec::with_capacity(4 * width as usize * height as usize);
    for rgb in data.chunks_exact(3) {
        rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 0xff]);
    }
    RgbaImage::from_raw(width, height, rgba).ok_or(Error::UnexpectedEndOfStream)
}

/// Serializes `image` as rgb24, dropping alpha. Fails without producing any
/// bytes when the image is not `width`x`height`.
pub fn encode<I>(image: &I, width: u32, height: u32) -> Result<Vec<u8>>
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8>,
{
    let actual = image.dimensions();
    if actual != (width, height) {
        return Err(Error::DimensionMismatch {
            expected: (width, height),
            actual,
        });
    }
    let mut data = Vec::with_capacity(3 * width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&image.get_pixel(x, y).to_rgb().0);
        }
    }
    Ok(data)
}

/// Opaque pixel with the given color.
#[cfg(test)]
pub(crate) fn opaque(r: u8, g: u8, b: u8) -> Rgba<u8> {
    Rgba([r, g, b, 0xff])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    #[test]
    fn test_decode_is_row_major_and_opaque() {
        // 2x2: red, green / blue, white
        let data = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let img = decode(&data, 2, 2).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(*img.get_pixel(0, 0), opaque(255, 0, 0));
        assert_eq!(*img.get_pixel(1, 0), opaque(0, 255, 0));
        assert_eq!(*img.get_pixel(0, 1), opaque(0, 0, 255));
        assert_eq!(*img.get_pixel(1, 1), opaque(255, 255, 255));
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        assert!(matches!(
            decode(&[0; 11], 2, 2),
            Err(Error::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn test_encode_drops_alpha() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        img.put_pixel(1, 0, Rgba([40, 50, 60, 128]));
        assert_eq!(encode(&img, 2, 1).unwrap(), [10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_encode_accepts_gray_images() {
        let img = GrayImage::from_pixel(3, 2, Luma([200]));
        let data = encode(&img, 3, 2).unwrap();
        assert_eq!(data.len(), 18);
        assert!(data.iter().all(|&b| b == 200));
    }

    #[test]
    fn test_encode_rejects_wrong_size() {
        let img = RgbImage::new(4, 4);
        match encode(&img, 4, 2) {
            Err(Error::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, (4, 2));
                assert_eq!(actual, (4, 4));
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_encode_preserves_rgb() {
        let data: Vec<u8> = (0..(3 * 4 * 3) as u8).collect();
        let img = decode(&data, 4, 3).unwrap();
        assert_eq!(encode(&img, 4, 3).unwrap(), data);
    }
}
