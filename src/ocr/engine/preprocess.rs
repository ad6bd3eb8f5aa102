use image::{GrayImage, Luma, RgbaImage};

use crate::ocr::TokenDetection;
use crate::ocr::geom::scale_down;

/// Longest side, in pixels, an upscaled OCR image may reach.
const MAX_OCR_SIDE: u32 = 4000;
const MAX_SCALE: u32 = 3;

/// Flattens onto white, converts to luma, and upscales small screen captures
/// so glyphs reach a size tesseract reads reliably. Returns the prepared image
/// and the integer scale that was applied.
pub(super) fn prepare_for_ocr(image: &RgbaImage, upscale: bool) -> (GrayImage, u32) {
    let (width, height) = image.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }

    let scale = if upscale { ocr_scale(width, height) } else { 1 };
    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };
    (contrast_stretch(resized), scale)
}

pub(super) fn ocr_scale(width: u32, height: u32) -> u32 {
    let side = width.max(height);
    let mut scale = MAX_SCALE;
    while side.saturating_mul(scale) > MAX_OCR_SIDE && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

/// Maps token geometry from the upscaled OCR image back to capture pixels.
pub(super) fn scale_tokens(tokens: Vec<TokenDetection>, scale: u32) -> Vec<TokenDetection> {
    if scale <= 1 {
        return tokens;
    }
    tokens
        .into_iter()
        .map(|token| TokenDetection {
            left: scale_down(token.left, scale),
            top: scale_down(token.top, scale),
            width: scale_down(token.width, scale),
            height: scale_down(token.height, scale),
            ..token
        })
        .collect()
}

fn contrast_stretch(mut image: GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        min = min.min(pixel[0]);
        max = max.max(pixel[0]);
    }
    if max <= min {
        return image;
    }

    let scale = 255.0 / (max as f32 - min as f32);
    for pixel in image.pixels_mut() {
        pixel[0] = ((pixel[0].saturating_sub(min)) as f32 * scale).round() as u8;
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn small_captures_are_upscaled_and_large_ones_are_not() {
        assert_eq!(ocr_scale(300, 200), 3);
        assert_eq!(ocr_scale(1500, 800), 2);
        assert_eq!(ocr_scale(3000, 1000), 1);
    }

    #[test]
    fn tall_captures_are_limited_by_height() {
        assert_eq!(ocr_scale(300, 20000), 1);
        assert_eq!(ocr_scale(300, 1800), 2);
        assert_eq!(ocr_scale(20, 4000), 1);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        image.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let (prepared, scale) = prepare_for_ocr(&image, false);
        assert_eq!(scale, 1);
        assert_eq!(prepared.get_pixel(0, 0)[0], 255);
        assert_eq!(prepared.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn token_geometry_is_mapped_back() {
        let token = TokenDetection {
            text: "hi".to_string(),
            left: 30,
            top: 61,
            width: 90,
            height: 35,
            conf: 90.0,
            block: 0,
            line: 0,
        };
        let scaled = scale_tokens(vec![token], 3);
        assert_eq!(
            (scaled[0].left, scaled[0].top, scaled[0].width, scaled[0].height),
            (10, 20, 30, 12)
        );
    }
}
