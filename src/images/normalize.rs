use crate::config::ImageConfig;
use crate::error::ImageError;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;

/// Re-encode an image into the single rendition the listing site accepts
///
/// - EXIF orientation 6 / 8 is applied as a 90 / 270 degree clockwise rotation
/// - palette, grayscale and alpha modes collapse to plain RGB
/// - images wider than `max_width` are downscaled proportionally
/// - output is baseline JPEG declaring the source's JFIF density capped at
///   `max_dpi`, or `max_dpi` when the source declares none
///
/// This is CPU-bound; async callers run it under `spawn_blocking`.
pub fn normalize(bytes: &[u8], config: &ImageConfig) -> Result<Vec<u8>, ImageError> {
    let dpi = declared_dpi(bytes).map_or(config.max_dpi, |dpi| dpi.min(config.max_dpi));

    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Normalize(format!("cannot read image: {e}")))?
        .into_decoder()?;

    // Missing or unreadable EXIF is not an error
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)?;

    img = match orientation {
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Rotate270 => img.rotate270(),
        _ => img,
    };

    let mut rgb = img.to_rgb8();

    if rgb.width() > config.max_width {
        let height = scaled_height(rgb.width(), rgb.height(), config.max_width);
        rgb = image::imageops::resize(&rgb, config.max_width, height, FilterType::Lanczos3);
    }

    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, config.jpeg_quality.clamp(1, 100));
        encoder.set_pixel_density(PixelDensity::dpi(dpi.max(1)));
        encoder.encode_image(&rgb)?;
    }
    Ok(out)
}

/// Horizontal density from a JPEG's JFIF APP0 segment, in dots per inch
fn declared_dpi(bytes: &[u8]) -> Option<u16> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut pos = 2;
    while let Some([0xFF, marker, hi, lo]) = bytes.get(pos..pos + 4) {
        let len = usize::from(u16::from_be_bytes([*hi, *lo]));
        match *marker {
            // Start of scan: no more header segments
            0xDA => return None,
            0xE0 => {
                let segment = bytes.get(pos + 4..pos + 2 + len)?;
                if segment.starts_with(b"JFIF\0") && segment.len() >= 10 {
                    let density = u16::from_be_bytes([segment[8], segment[9]]);
                    let dpi = match segment[7] {
                        1 => density,
                        2 => (f64::from(density) * 2.54).round() as u16,
                        _ => return None,
                    };
                    return (dpi > 0).then_some(dpi);
                }
            }
            _ => {}
        }
        pos += 2 + len;
    }
    None
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = (u64::from(height) * u64::from(target_width) + u64::from(width) / 2) / u64::from(width);
    (scaled as u32).max(1)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::fixtures;
    use image::GenericImageView;

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn wide_images_are_downscaled_proportionally() {
        let out = normalize(&fixtures::jpeg(2048, 1000), &ImageConfig::default()).unwrap();
        assert_eq!(decode(&out).dimensions(), (1024, 500));
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let out = normalize(&fixtures::jpeg(800, 600), &ImageConfig::default()).unwrap();
        assert_eq!(decode(&out).dimensions(), (800, 600));
    }

    #[test]
    fn alpha_png_becomes_rgb_jpeg() {
        let out = normalize(&fixtures::png_rgba(40, 30), &ImageConfig::default()).unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        assert_eq!(decode(&out).color(), image::ColorType::Rgb8);
    }

    #[test]
    fn orientation_six_rotates_clockwise() {
        let out = normalize(&fixtures::jpeg_with_orientation(40, 20, 6), &ImageConfig::default()).unwrap();
        assert_eq!(decode(&out).dimensions(), (20, 40));
    }

    #[test]
    fn orientation_eight_rotates_counter_clockwise() {
        let out = normalize(&fixtures::jpeg_with_orientation(40, 20, 8), &ImageConfig::default()).unwrap();
        assert_eq!(decode(&out).dimensions(), (20, 40));
    }

    #[test]
    fn upright_orientation_is_left_alone() {
        let out = normalize(&fixtures::jpeg_with_orientation(40, 20, 1), &ImageConfig::default()).unwrap();
        assert_eq!(decode(&out).dimensions(), (40, 20));
    }

    /// JFIF APP0: "JFIF\0", version (2), units (1), x density (2), y density (2)
    fn output_density(out: &[u8]) -> (u8, u16) {
        let jfif = out.windows(5).position(|w| w == b"JFIF\0").unwrap();
        (out[jfif + 7], u16::from_be_bytes([out[jfif + 8], out[jfif + 9]]))
    }

    fn jpeg_at(density: PixelDensity) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 90);
        encoder.set_pixel_density(density);
        encoder.encode_image(&fixtures::noisy_rgb(32, 32)).unwrap();
        out
    }

    #[test]
    fn high_density_is_capped_at_max_dpi() {
        let out = normalize(&jpeg_at(PixelDensity::dpi(300)), &ImageConfig::default()).unwrap();
        assert_eq!(output_density(&out), (1, 72));
    }

    #[test]
    fn low_density_is_kept() {
        let out = normalize(&jpeg_at(PixelDensity::dpi(30)), &ImageConfig::default()).unwrap();
        assert_eq!(output_density(&out), (1, 30));
    }

    #[test]
    fn sources_without_density_declare_max_dpi() {
        let out = normalize(&fixtures::png_rgba(32, 32), &ImageConfig::default()).unwrap();
        assert_eq!(output_density(&out), (1, 72));
    }

    #[test]
    fn declared_dpi_reads_jfif_units() {
        assert_eq!(declared_dpi(&jpeg_at(PixelDensity::dpi(96))), Some(96));
        let per_cm = PixelDensity {
            density: (20, 20),
            unit: image::codecs::jpeg::PixelDensityUnit::Centimeters,
        };
        assert_eq!(declared_dpi(&jpeg_at(per_cm)), Some(51));
        assert_eq!(declared_dpi(&fixtures::png_rgba(4, 4)), None);
        assert_eq!(declared_dpi(&[0xFF, 0xD8, 0xFF]), None);
    }

    #[test]
    fn undecodable_bytes_are_a_normalize_error() {
        let err = normalize(b"definitely not an image", &ImageConfig::default()).unwrap_err();
        assert!(matches!(err, ImageError::Normalize(_)));
    }

    #[test]
    fn scaled_height_rounds_and_never_hits_zero() {
        assert_eq!(scaled_height(2048, 1000, 1024), 500);
        assert_eq!(scaled_height(3000, 1000, 1024), 341);
        assert_eq!(scaled_height(100_000, 1, 1024), 1);
    }
}
