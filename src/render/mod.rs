//! Composites translated text over the original capture.
//!
//! Every line's background patch is painted before any text is drawn, so a
//! later patch can never cover an earlier line's text when expanded boxes
//! overlap.

use image::RgbaImage;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use usvg::fontdb;

mod canvas;
mod font;

pub use font::{
    FontMetrics, OverlayFont, font_from_database, load_font_metrics, resolve_overlay_font,
};

use crate::error::{PipelineError, RenderError, panic_message};
use crate::ocr::{Line, LineBox};
use canvas::PixmapCanvas;

/// Pixels added on every side of a line box before it is painted over.
pub const PATCH_MARGIN: u32 = 2;
pub const MIN_INITIAL_FONT_SIZE: u32 = 12;
pub const MIN_FONT_SIZE: u32 = 10;

const DEFAULT_FILL: [u8; 3] = [255, 255, 255];
const DEFAULT_TEXT_COLOR: &str = "#000000";

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub font_path: Option<PathBuf>,
    pub fill_color: String,
    pub text_color: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            fill_color: "#ffffff".to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PatchRect {
    /// `bbox` grown by [`PATCH_MARGIN`], clipped to a `width` x `height` image.
    pub fn around(bbox: &LineBox, width: u32, height: u32) -> Self {
        let x = bbox.x_min.saturating_sub(PATCH_MARGIN).min(width);
        let y = bbox.y_min.saturating_sub(PATCH_MARGIN).min(height);
        let right = bbox.x_max.saturating_add(PATCH_MARGIN).min(width);
        let bottom = bbox.y_max.saturating_add(PATCH_MARGIN).min(height);
        Self {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }
}

/// Drawing surface for [`paint_overlay`].
pub trait OverlayCanvas {
    fn fill_patch(&mut self, patch: PatchRect);
    fn measure_text(&self, text: &str, font_size: f32) -> f32;
    /// Draws `text` with its top-left corner at (`x`, `y`).
    fn draw_text(&mut self, x: f32, y: f32, text: &str, font_size: f32)
        -> Result<(), RenderError>;
}

/// Starts at 90% of the box height and shrinks once, proportionally, when
/// the text is wider than the box.
pub fn fit_font_size(box_width: u32, box_height: u32, measure: impl Fn(f32) -> f32) -> u32 {
    let initial = ((box_height as f32 * 0.9).round() as u32).max(MIN_INITIAL_FONT_SIZE);
    let measured = measure(initial as f32);
    if box_width > 0 && measured > box_width as f32 {
        let shrunk = (initial as f32 * box_width as f32 / measured).round() as u32;
        return shrunk.max(MIN_FONT_SIZE);
    }
    initial
}

/// Paints `lines` with their translations onto `canvas` and returns the
/// indices of lines whose text could not be drawn, with the reason.
///
/// `texts` is matched to `lines` by index; a missing entry draws nothing.
pub fn paint_overlay<C: OverlayCanvas>(
    canvas: &mut C,
    size: (u32, u32),
    lines: &[Line],
    texts: &[String],
) -> Vec<(usize, RenderError)> {
    let (width, height) = size;
    for line in lines {
        canvas.fill_patch(PatchRect::around(&line.bbox, width, height));
    }

    let mut failures = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let text = texts.get(idx).map(String::as_str).unwrap_or_default();
        let result = catch_unwind(AssertUnwindSafe(|| draw_line(&mut *canvas, &line.bbox, text)))
            .unwrap_or_else(|payload| Err(RenderError::Text(panic_message(payload.as_ref()))));
        if let Err(err) = result {
            warn!("render: line {} skipped: {}", idx, err);
            failures.push((idx, err));
        }
    }
    failures
}

fn draw_line<C: OverlayCanvas>(canvas: &mut C, bbox: &LineBox, text: &str) -> Result<(), RenderError> {
    if bbox.is_empty() {
        return Err(RenderError::EmptyBox {
            width: bbox.width(),
            height: bbox.height(),
        });
    }
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    let font_size = fit_font_size(bbox.width(), bbox.height(), |size| {
        canvas.measure_text(text, size)
    });
    debug!(
        "render: '{}' at {}px in {}x{}",
        text,
        font_size,
        bbox.width(),
        bbox.height()
    );
    canvas.draw_text(bbox.x_min as f32, bbox.y_min as f32, text, font_size as f32)
}

#[derive(Debug, Clone)]
pub struct RenderedOverlay {
    pub image: RgbaImage,
    /// Lines that kept a blank patch because their text could not be drawn.
    pub failed_lines: Vec<usize>,
}

impl RenderedOverlay {
    pub fn partial_failure(&self, total: usize) -> Option<PipelineError> {
        (!self.failed_lines.is_empty()).then(|| PipelineError::RenderPartialFailure {
            failed: self.failed_lines.len(),
            total,
        })
    }
}

pub struct OverlayRenderer {
    font: OverlayFont,
    fontdb: Arc<fontdb::Database>,
    fill: [u8; 3],
    text_color: String,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Self {
        let font = resolve_overlay_font(config.font_path.as_deref());
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self::with_font(config, font, db)
    }

    /// Draws with `font`, taking glyphs from `db`. A fallback `font` is
    /// replaced by a face from `db` when there is one; otherwise lines fail
    /// to draw and are reported in [`RenderedOverlay::failed_lines`].
    pub fn with_font(config: &OverlayConfig, font: OverlayFont, mut db: fontdb::Database) -> Self {
        let font = if font.is_fallback() {
            match font_from_database(&db) {
                Some(found) => {
                    db.set_sans_serif_family(found.family());
                    found
                }
                None => {
                    warn!("no usable face in the font database, overlay text cannot be drawn");
                    font
                }
            }
        } else {
            if let Some(metrics) = font.metrics() {
                db.load_font_data(metrics.data().to_vec());
                if let Some(family) = metrics.family() {
                    db.set_sans_serif_family(family);
                }
            }
            font
        };
        let fill = parse_hex_color(&config.fill_color).unwrap_or_else(|| {
            warn!("invalid fill color '{}', using white", config.fill_color);
            DEFAULT_FILL
        });
        let text_color = match parse_hex_color(&config.text_color) {
            Some([r, g, b]) => format!("#{:02x}{:02x}{:02x}", r, g, b),
            None => {
                warn!("invalid text color '{}', using black", config.text_color);
                DEFAULT_TEXT_COLOR.to_string()
            }
        };
        Self {
            font,
            fontdb: Arc::new(db),
            fill,
            text_color,
        }
    }

    pub fn font(&self) -> &OverlayFont {
        &self.font
    }

    /// Returns a new image; `image` is left untouched so it can be rendered
    /// again with a different translation.
    pub fn render(
        &self,
        image: &RgbaImage,
        lines: &[Line],
        texts: &[String],
    ) -> Result<RenderedOverlay, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "{}x{} image",
                image.width(),
                image.height()
            )));
        }
        let mut canvas = PixmapCanvas::from_image(
            image,
            self.fill,
            &self.text_color,
            &self.font,
            self.fontdb.clone(),
        )
        .map_err(|err| PipelineError::InvalidImage(format!("{:#}", err)))?;
        let failures = paint_overlay(&mut canvas, image.dimensions(), lines, texts);
        let image = canvas
            .into_image()
            .map_err(|err| PipelineError::Internal(format!("{:#}", err)))?;
        Ok(RenderedOverlay {
            image,
            failed_lines: failures.into_iter().map(|(idx, _)| idx).collect(),
        })
    }
}

/// `#rgb` or `#rrggbb`; the leading `#` is optional.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, ch) in out.iter_mut().zip(hex.chars()) {
                let digit = ch.to_digit(16)? as u8;
                *slot = digit * 17;
            }
            Some(out)
        }
        6 => {
            let mut out = [0u8; 3];
            for (idx, slot) in out.iter_mut().enumerate() {
                *slot = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16).ok()?;
            }
            Some(out)
        }
        _ => None,
    }
}
