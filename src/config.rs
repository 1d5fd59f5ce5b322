//! Runtime settings.
//!
//! Everything is read from the environment (optionally seeded from `.env` by
//! `dotenvy` in `main`). Every variable has a default so the server starts with
//! no configuration against locally running engines.

use crate::overlay::OverlayStyle;
use std::str::FromStr;
use tracing::warn;

/// Default Tesseract confidence cut-off (0-100); detections at or below are dropped.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub tesseract: TesseractSettings,
    pub easyocr: EasyOcrSettings,
    pub unstructured: UnstructuredSettings,
    pub pdf: PdfSettings,
    pub image_style: OverlayStyle,
    pub pdf_style: OverlayStyle,
}

#[derive(Debug, Clone)]
pub struct TesseractSettings {
    pub command: String,
    pub languages: String,
    pub min_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct EasyOcrSettings {
    pub url: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UnstructuredSettings {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PdfSettings {
    pub pdftoppm: String,
    pub dpi: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_upload_bytes: 100 * 1024 * 1024,
            tesseract: TesseractSettings {
                command: "tesseract".to_string(),
                languages: "kor+eng".to_string(),
                min_confidence: DEFAULT_MIN_CONFIDENCE,
            },
            easyocr: EasyOcrSettings {
                url: "http://localhost:3002".to_string(),
                languages: vec!["ko".to_string(), "en".to_string()],
            },
            unstructured: UnstructuredSettings {
                url: "http://localhost:8000".to_string(),
                api_key: None,
            },
            pdf: PdfSettings {
                pdftoppm: "pdftoppm".to_string(),
                dpi: 200,
            },
            image_style: OverlayStyle::image_default(),
            pdf_style: OverlayStyle::pdf_default(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let max_upload_mb: usize = parsed(&lookup, "MAX_UPLOAD_MB", 100);
        let image_width = parsed(&lookup, "IMAGE_STROKE_WIDTH", defaults.image_style.width);
        let pdf_width = parsed(&lookup, "PDF_STROKE_WIDTH", defaults.pdf_style.width);

        Self {
            bind_addr: string("BIND_ADDR", defaults.bind_addr),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            tesseract: TesseractSettings {
                command: string("TESSERACT_CMD", defaults.tesseract.command),
                languages: string("TESSERACT_LANG", defaults.tesseract.languages),
                min_confidence: parsed(
                    &lookup,
                    "TESSERACT_MIN_CONFIDENCE",
                    defaults.tesseract.min_confidence,
                ),
            },
            easyocr: EasyOcrSettings {
                url: string("EASYOCR_URL", defaults.easyocr.url),
                languages: lookup("EASYOCR_LANGS")
                    .map(|v| split_list(&v))
                    .filter(|langs| !langs.is_empty())
                    .unwrap_or(defaults.easyocr.languages),
            },
            unstructured: UnstructuredSettings {
                url: string("UNSTRUCTURED_URL", defaults.unstructured.url),
                api_key: lookup("UNSTRUCTURED_API_KEY").filter(|k| !k.is_empty()),
            },
            pdf: PdfSettings {
                pdftoppm: string("PDFTOPPM_CMD", defaults.pdf.pdftoppm),
                dpi: parsed(&lookup, "PDF_DPI", defaults.pdf.dpi),
            },
            image_style: defaults.image_style.with_width(image_width),
            pdf_style: defaults.pdf_style.with_width(pdf_width),
        }
    }
}

/// Parse a variable, falling back to `default` (with a warning) when malformed.
fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value for {}: {:?}, using default {}", key, raw, default);
                default
            }
        },
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
