use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use tracing::{debug, warn};
use usvg::fontdb;

const FALLBACK_FAMILY: &str = "sans-serif";
const FALLBACK_ASCENDER_RATIO: f32 = 0.8;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

/// The font used for every overlay line, resolved once per renderer.
///
/// Without metrics widths come from per-script estimates and text is drawn
/// with the generic sans-serif family, which only works if the renderer's
/// font database maps that family to an installed face.
#[derive(Clone)]
pub struct OverlayFont {
    metrics: Option<FontMetrics>,
    family: String,
}

impl OverlayFont {
    pub fn fallback() -> Self {
        Self {
            metrics: None,
            family: FALLBACK_FAMILY.to_string(),
        }
    }

    pub fn from_metrics(metrics: FontMetrics) -> Self {
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .unwrap_or_else(|| FALLBACK_FAMILY.to_string());
        Self {
            metrics: Some(metrics),
            family,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn metrics(&self) -> Option<&FontMetrics> {
        self.metrics.as_ref()
    }

    pub fn is_fallback(&self) -> bool {
        self.metrics.is_none()
    }

    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width_px(text, font_size, self.metrics.as_ref())
    }

    /// Distance from the top of the line box to the baseline, per pixel of
    /// font size.
    pub fn ascender_ratio(&self) -> f32 {
        match &self.metrics {
            Some(font) if font.ascender > 0 => {
                font.ascender as f32 / font.units_per_em.max(1) as f32
            }
            _ => FALLBACK_ASCENDER_RATIO,
        }
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Picks the overlay font: the configured file, then a CJK-capable system
/// font, then the built-in fallback. Never fails.
pub fn resolve_overlay_font(configured: Option<&Path>) -> OverlayFont {
    if let Some(path) = configured {
        match load_font_metrics(path) {
            Ok(metrics) => return OverlayFont::from_metrics(metrics),
            Err(err) => warn!("overlay font unusable, trying system fonts: {:#}", err),
        }
    }
    for candidate in system_font_candidates() {
        if !candidate.is_file() {
            continue;
        }
        match load_font_metrics(&candidate) {
            Ok(metrics) => {
                debug!("overlay font: {}", candidate.display());
                return OverlayFont::from_metrics(metrics);
            }
            Err(err) => debug!("skipping system font: {:#}", err),
        }
    }
    warn!("no CJK-capable font found, using the built-in fallback");
    OverlayFont::fallback()
}

/// Picks an installed face to stand in for the generic family, preferring
/// upright regular sans faces. `None` when no face in `db` parses.
pub fn font_from_database(db: &fontdb::Database) -> Option<OverlayFont> {
    let mut faces = db
        .faces()
        .filter(|face| !face.families.is_empty())
        .collect::<Vec<_>>();
    faces.sort_by_key(|face| {
        let sans = face.families.iter().any(|(name, _)| name.contains("Sans"));
        (
            face.monospaced,
            face.style != fontdb::Style::Normal,
            face.weight.0.abs_diff(fontdb::Weight::NORMAL.0),
            !sans,
        )
    });
    for face in faces {
        let family = &face.families[0].0;
        let metrics = db
            .with_face_data(face.id, |data, index| load_face_metrics(data, index))
            .flatten();
        if let Some(mut metrics) = metrics {
            debug!("fallback font: {} ({:?})", family, face.source);
            metrics.family = Some(family.clone());
            return Some(OverlayFont::from_metrics(metrics));
        }
    }
    None
}

fn system_font_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(target_os = "windows") {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| r"C:\Windows".to_string());
        let fonts = Path::new(&windir).join("Fonts");
        for name in ["msyh.ttc", "simhei.ttf", "simsun.ttc"] {
            candidates.push(fonts.join(name));
        }
    } else if cfg!(target_os = "macos") {
        for path in [
            "/System/Library/Fonts/PingFang.ttc",
            "/System/Library/Fonts/STHeiti Medium.ttc",
            "/Library/Fonts/Arial Unicode.ttf",
        ] {
            candidates.push(PathBuf::from(path));
        }
    } else {
        for path in [
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ] {
            candidates.push(PathBuf::from(path));
        }
    }
    candidates
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Ok(face) = Face::parse(&font.data, font.face_index)
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(font.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(font.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        let units = font.units_per_em.max(1) as f32;
        return advance as f32 * (font_size / units);
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0xAC00..=0xD7AF | 0xFF00..=0xFFEF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

/// Takes the first parseable face; `.ttc` collections put the regular face
/// first for the fonts we probe.
fn load_font_metrics_from_data(data: &[u8]) -> Result<FontMetrics> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    (0..count)
        .find_map(|index| load_face_metrics(data, index))
        .ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_face_metrics(data: &[u8], index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Some(FontMetrics {
        data: Arc::new(data.to_vec()),
        units_per_em,
        space_advance,
        ascender: face.ascender(),
        family: extract_family_name(&face),
        face_index: index,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
