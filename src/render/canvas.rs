use anyhow::{Context, anyhow};
use image::RgbaImage;
use resvg::render;
use std::sync::Arc;
use tiny_skia::{Color, IntSize, Paint, Pixmap, Rect, Transform};
use usvg::{Options, Tree, fontdb};

use super::font::OverlayFont;
use super::{OverlayCanvas, PatchRect};
use crate::error::RenderError;

/// Draws onto a copy of the capture held as a tiny-skia pixmap. Text goes
/// through resvg so the font database handles shaping and fallback.
pub(crate) struct PixmapCanvas<'a> {
    pixmap: Pixmap,
    fill: Color,
    text_color: &'a str,
    font: &'a OverlayFont,
    fontdb: Arc<fontdb::Database>,
}

impl<'a> PixmapCanvas<'a> {
    pub(crate) fn from_image(
        image: &RgbaImage,
        fill: [u8; 3],
        text_color: &'a str,
        font: &'a OverlayFont,
        fontdb: Arc<fontdb::Database>,
    ) -> anyhow::Result<Self> {
        let size = IntSize::from_wh(image.width(), image.height())
            .ok_or_else(|| anyhow!("image has zero size"))?;
        let mut data = image.as_raw().clone();
        premultiply(&mut data);
        let pixmap =
            Pixmap::from_vec(data, size).ok_or_else(|| anyhow!("pixel buffer size mismatch"))?;
        Ok(Self {
            pixmap,
            fill: Color::from_rgba8(fill[0], fill[1], fill[2], 255),
            text_color,
            font,
            fontdb,
        })
    }

    pub(crate) fn into_image(self) -> anyhow::Result<RgbaImage> {
        let width = self.pixmap.width();
        let height = self.pixmap.height();
        let mut data = self.pixmap.take();
        demultiply(&mut data);
        RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to build image buffer from pixmap"))
    }

    fn text_svg(&self, x: f32, baseline: f32, text: &str, font_size: f32) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" xml:space="preserve">{text}</text></svg>"#,
            w = self.pixmap.width(),
            h = self.pixmap.height(),
            x = x,
            y = baseline,
            size = font_size,
            color = escape_xml(self.text_color),
            family = escape_xml(self.font.family()),
            text = escape_xml(text)
        )
    }
}

impl OverlayCanvas for PixmapCanvas<'_> {
    fn fill_patch(&mut self, patch: PatchRect) {
        let Some(rect) = Rect::from_xywh(
            patch.x as f32,
            patch.y as f32,
            patch.width as f32,
            patch.height as f32,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(self.fill);
        paint.anti_alias = false;
        self.pixmap
            .fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn measure_text(&self, text: &str, font_size: f32) -> f32 {
        self.font.measure(text, font_size)
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str, font_size: f32) -> Result<(), RenderError> {
        let baseline = y + font_size * self.font.ascender_ratio();
        let svg = self.text_svg(x, baseline, text, font_size);
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options)
            .with_context(|| "failed to parse text SVG")
            .map_err(|err| RenderError::Text(format!("{:#}", err)))?;
        // usvg drops text it has no face for instead of failing.
        if !tree.root().has_children() {
            return Err(RenderError::Text(format!(
                "no installed font can draw '{}' with family '{}'",
                text,
                self.font.family()
            )));
        }
        let mut pixmap_mut = self.pixmap.as_mut();
        render(&tree, Transform::identity(), &mut pixmap_mut);
        Ok(())
    }
}

fn premultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
}

fn demultiply(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            *channel = if alpha == 0 {
                0
            } else {
                ((*channel as u16 * 255 + alpha / 2) / alpha).min(255) as u8
            };
        }
    }
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
