use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::{OcrConfig, resolve_tesseract_cmd};
use crate::providers::TranslatorConfig;
use crate::render::OverlayConfig;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_native: bool,
    pub tesseract_cmd: Option<String>,
    pub ocr_languages: String,
    pub ocr_psm: u32,
    pub ocr_upscale: bool,
    pub overlay_font_path: Option<String>,
    pub overlay_fill_color: String,
    pub overlay_text_color: String,
    pub provider: String,
    pub source_lang: String,
    pub target_lang: String,
    pub openai_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        let ocr = OcrConfig::default();
        let overlay = OverlayConfig::default();
        let translator = TranslatorConfig::default();
        Self {
            ocr_native: ocr.native,
            tesseract_cmd: None,
            ocr_languages: ocr.languages,
            ocr_psm: ocr.psm,
            ocr_upscale: ocr.upscale,
            overlay_font_path: None,
            overlay_fill_color: overlay.fill_color,
            overlay_text_color: overlay.text_color,
            provider: translator.provider,
            source_lang: translator.source_lang,
            target_lang: translator.target_lang,
            openai_model: translator.openai_model,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    overlay: Option<OverlaySettings>,
    translator: Option<TranslatorSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    native: Option<bool>,
    tesseract_cmd: Option<String>,
    languages: Option<String>,
    psm: Option<u32>,
    upscale: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_path: Option<String>,
    fill_color: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslatorSettings {
    provider: Option<String>,
    source_lang: Option<String>,
    target_lang: Option<String>,
    openai_model: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(native) = ocr.native {
                self.ocr_native = native;
            }
            if let Some(cmd) = non_empty(ocr.tesseract_cmd) {
                self.tesseract_cmd = Some(cmd);
            }
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr_languages = languages;
            }
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
            if let Some(upscale) = ocr.upscale {
                self.ocr_upscale = upscale;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = non_empty(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(color) = non_empty(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay_text_color = color;
            }
        }
        if let Some(translator) = incoming.translator {
            if let Some(provider) = non_empty(translator.provider) {
                self.provider = provider;
            }
            if let Some(lang) = non_empty(translator.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_empty(translator.target_lang) {
                self.target_lang = lang;
            }
            if let Some(model) = non_empty(translator.openai_model) {
                self.openai_model = model;
            }
        }
    }

    /// Probes for the tesseract binary when none is configured.
    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            native: self.ocr_native,
            tesseract_cmd: resolve_tesseract_cmd(self.tesseract_cmd.as_deref()),
            languages: self.ocr_languages.clone(),
            psm: self.ocr_psm,
            upscale: self.ocr_upscale,
        }
    }

    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            font_path: self.overlay_font_path.as_ref().map(PathBuf::from),
            fill_color: self.overlay_fill_color.clone(),
            text_color: self.overlay_text_color.clone(),
        }
    }

    pub fn translator_config(&self, openai_key: Option<String>) -> TranslatorConfig {
        TranslatorConfig {
            provider: self.provider.clone(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            openai_model: self.openai_model.clone(),
            openai_key,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".overlay-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn embedded_defaults_match_built_in_defaults() {
        let mut settings = Settings::default();
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("defaults parse");
        settings.merge(parsed);
        assert!(settings.ocr_native);
        assert_eq!(settings.tesseract_cmd, None);
        assert_eq!(settings.ocr_languages, "eng");
        assert_eq!(settings.ocr_psm, 3);
        assert_eq!(settings.overlay_font_path, None);
        assert_eq!(settings.overlay_fill_color, "#ffffff");
        assert_eq!(settings.provider, "google");
        assert_eq!(settings.target_lang, "zh-CN");
        assert_eq!(settings.openai_model, "gpt-3.5-turbo");
    }

    #[test]
    fn first_load_writes_home_settings() {
        with_temp_home(|home| {
            load_settings(None).expect("settings");
            let written = home.join(".overlay-translator-rust").join("settings.toml");
            let content = fs::read_to_string(written).expect("home settings");
            assert_eq!(content, DEFAULT_SETTINGS_TOML);
        });
    }

    #[test]
    fn later_files_override_earlier_ones() {
        with_temp_home(|home| {
            let dir = home.join(".overlay-translator-rust");
            fs::create_dir_all(&dir).expect("dir");
            fs::write(
                dir.join("settings.local.toml"),
                "[translator]\nprovider = \"openai\"\ntarget_lang = \"ja\"\n",
            )
            .expect("local");
            let extra = home.join("extra.toml");
            fs::write(
                &extra,
                "[translator]\ntarget_lang = \"ko\"\n[ocr]\nnative = false\npsm = 6\ntesseract_cmd = \"/opt/tess\"\n[overlay]\nfill_color = \"  \"\n",
            )
            .expect("extra");

            let settings = load_settings(Some(&extra)).expect("settings");
            assert_eq!(settings.provider, "openai");
            assert_eq!(settings.target_lang, "ko");
            assert_eq!(settings.overlay_fill_color, "#ffffff");

            let ocr = settings.ocr_config();
            assert!(!ocr.native);
            assert_eq!(ocr.psm, 6);
            assert_eq!(ocr.tesseract_cmd, PathBuf::from("/opt/tess"));

            let translator = settings.translator_config(Some("sk".to_string()));
            assert_eq!(translator.target_lang, "ko");
            assert_eq!(translator.openai_key.as_deref(), Some("sk"));
        });
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("nope.toml"))).expect_err("missing");
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn overlay_font_path_becomes_a_path() {
        let settings = Settings {
            overlay_font_path: Some("/fonts/msyh.ttc".to_string()),
            ..Settings::default()
        };
        assert_eq!(
            settings.overlay_config().font_path,
            Some(PathBuf::from("/fonts/msyh.ttc"))
        );
    }
}
