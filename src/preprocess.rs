use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};

/// Side of the square input the flower classifier was trained on.
pub const INPUT_SIZE: u32 = 224;

const CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum InvalidImage {
    #[error("image payload is empty")]
    Empty,
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A single normalized RGB image laid out as `[1, side, side, 3]`, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pixels: Vec<f32>,
    side: usize,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, self.side, self.side, CHANNELS]
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.pixels
    }

    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let total: f64 = self.pixels.iter().map(|&v| f64::from(v)).sum();
        (total / self.pixels.len() as f64) as f32
    }

    /// Copies the pixels onto `device` as an NHWC f32 tensor.
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(self.as_slice(), (1, self.side, self.side, CHANNELS), device)
    }
}

/// Decodes any supported raster format, forces three channels, resizes to
/// `side x side` and scales to `[0, 1]`.
pub fn decode_and_normalize(raw: &[u8], side: u32) -> Result<ImageTensor, InvalidImage> {
    if raw.is_empty() {
        return Err(InvalidImage::Empty);
    }

    let decoded = image::load_from_memory(raw)?;
    tracing::trace!(
        width = decoded.width(),
        height = decoded.height(),
        color = ?decoded.color(),
        "Decoded upload"
    );

    let rgb = decoded.to_rgb8();
    let resized = if rgb.dimensions() == (side, side) {
        rgb
    } else {
        imageops::resize(&rgb, side, side, FilterType::Triangle)
    };

    let pixels = resized
        .into_raw()
        .into_iter()
        .map(|value| f32::from(value) / 255.0)
        .collect();

    Ok(ImageTensor {
        pixels,
        side: side as usize,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, GrayAlphaImage, ImageFormat, LumaA, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        encode(DynamicImage::ImageRgb8(image), ImageFormat::Png)
    }

    fn assert_normalized(tensor: &ImageTensor) {
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
        assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn solid_color_survives_normalization() {
        let raw = solid_png(224, 224, [255, 128, 0]);
        let tensor = decode_and_normalize(&raw, INPUT_SIZE).unwrap();
        assert_normalized(&tensor);

        let expected = (255.0 + 128.0 + 0.0) / 3.0 / 255.0;
        assert!((tensor.mean() - expected).abs() < 1e-4);
        assert_eq!(&tensor.as_slice()[..3], &[1.0, 128.0 / 255.0, 0.0]);
    }

    #[test]
    fn any_size_and_format_is_resized() {
        let wide = solid_png(640, 120, [10, 20, 30]);
        let tensor = decode_and_normalize(&wide, INPUT_SIZE).unwrap();
        assert_normalized(&tensor);
        let expected = 20.0 / 255.0;
        assert!((tensor.mean() - expected).abs() < 2.0 / 255.0);

        let gradient =
            RgbImage::from_fn(37, 301, |x, y| Rgb([(x * 6) as u8, (y % 256) as u8, 200]));
        let jpeg = encode(DynamicImage::ImageRgb8(gradient), ImageFormat::Jpeg);
        assert_normalized(&decode_and_normalize(&jpeg, INPUT_SIZE).unwrap());
    }

    #[test]
    fn alpha_is_dropped_and_gray_is_expanded() {
        let rgba = RgbaImage::from_pixel(224, 224, Rgba([0, 255, 0, 10]));
        let raw = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);
        let tensor = decode_and_normalize(&raw, INPUT_SIZE).unwrap();
        assert_normalized(&tensor);
        assert_eq!(&tensor.as_slice()[..3], &[0.0, 1.0, 0.0]);

        let gray = GrayAlphaImage::from_pixel(224, 224, LumaA([51, 255]));
        let raw = encode(DynamicImage::ImageLumaA8(gray), ImageFormat::Png);
        let tensor = decode_and_normalize(&raw, INPUT_SIZE).unwrap();
        assert_normalized(&tensor);
        assert_eq!(&tensor.as_slice()[..3], &[0.2, 0.2, 0.2]);
    }

    #[test]
    fn custom_side_is_honoured() {
        let tensor = decode_and_normalize(&solid_png(10, 10, [0, 0, 0]), 32).unwrap();
        assert_eq!(tensor.shape(), [1, 32, 32, 3]);
        assert_eq!(tensor.side(), 32);
        assert_eq!(tensor.mean(), 0.0);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(decode_and_normalize(&[], INPUT_SIZE), Err(InvalidImage::Empty)));
        assert!(matches!(
            decode_and_normalize(b"this is a text file, not a jpeg", INPUT_SIZE),
            Err(InvalidImage::Decode(_))
        ));

        let mut truncated = solid_png(64, 64, [1, 2, 3]);
        truncated.truncate(truncated.len() / 2);
        assert!(decode_and_normalize(&truncated, INPUT_SIZE).is_err());
    }

    #[test]
    fn converts_to_candle_tensor() {
        let tensor = decode_and_normalize(&solid_png(8, 8, [255, 255, 255]), INPUT_SIZE).unwrap();
        let candle = tensor.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(candle.dims(), &[1, 224, 224, 3]);
        let mean = candle.mean_all().unwrap().to_scalar::<f32>().unwrap();
        assert!((mean - 1.0).abs() < 1e-6);
    }
}
