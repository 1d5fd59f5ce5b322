//! Modular OCR engine abstraction.
//!
//! Defines the [`OcrEngine`] trait and the unified [`Extraction`] result so the
//! three backends (Tesseract CLI, EasyOCR sidecar, Unstructured API) can be
//! swapped via query parameter. Engine failures are turned into inline error
//! text by [`extract`]; nothing past this module sees an engine error.

pub mod easyocr;
pub mod tesseract;
pub mod unstructured;

use crate::config::Settings;
use crate::region::Region;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use easyocr::EasyOcrEngine;
use tesseract::TesseractEngine;
use unstructured::UnstructuredEngine;

/// Unified result returned by every engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub text: String,
    pub regions: Vec<Region>,
}

impl Extraction {
    /// Inline error result: message in place of text, no regions.
    pub fn failed(engine: &str, err: &anyhow::Error) -> Self {
        Self {
            text: format!("{} error: {:#}", engine, err),
            regions: Vec::new(),
        }
    }
}

/// Input to an engine: raw bytes plus what they are.
#[derive(Debug, Clone)]
pub struct OcrInput {
    pub filename: String,
    pub mime: &'static str,
    pub data: Vec<u8>,
}

/// Partitioning strategy for the Unstructured engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Layout model; slower, typed elements.
    #[default]
    HiRes,
    /// OCR only; fast.
    OcrOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::HiRes, Strategy::OcrOnly];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hi_res" => Some(Self::HiRes),
            "ocr_only" => Some(Self::OcrOnly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HiRes => "hi_res",
            Self::OcrOnly => "ocr_only",
        }
    }
}

/// Per-call options. Engines ignore what does not apply to them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub strategy: Strategy,
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Display name, used as the prefix of inline error messages.
    fn name(&self) -> &str;
    async fn recognize(&self, input: &OcrInput, options: &ExtractOptions) -> anyhow::Result<Extraction>;
}

/// Known engine identifiers used for registry lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Tesseract,
    EasyOcr,
    Unstructured,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [Self::Tesseract, Self::EasyOcr, Self::Unstructured];

    /// Parse a query-parameter string into an engine kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tesseract" => Some(Self::Tesseract),
            "easyocr" => Some(Self::EasyOcr),
            "unstructured" => Some(Self::Unstructured),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::EasyOcr => "easyocr",
            Self::Unstructured => "unstructured",
        }
    }
}

/// Run an engine, converting any failure into an inline error result.
pub async fn extract(engine: &dyn OcrEngine, input: &OcrInput, options: &ExtractOptions) -> Extraction {
    match engine.recognize(input, options).await {
        Ok(extraction) => {
            info!(
                "{}: {} region(s), {} chars from {}",
                engine.name(),
                extraction.regions.len(),
                extraction.text.len(),
                input.filename
            );
            extraction
        }
        Err(err) => {
            warn!("{} failed on {}: {:#}", engine.name(), input.filename, err);
            Extraction::failed(engine.name(), &err)
        }
    }
}

/// All configured engines, built once at startup.
pub struct Engines {
    tesseract: TesseractEngine,
    easyocr: EasyOcrEngine,
    unstructured: UnstructuredEngine,
}

impl Engines {
    pub fn new(settings: &Settings, client: reqwest::Client) -> Self {
        Self {
            tesseract: TesseractEngine::new(&settings.tesseract),
            easyocr: EasyOcrEngine::new(&settings.easyocr, client.clone()),
            unstructured: UnstructuredEngine::new(&settings.unstructured, client),
        }
    }

    pub fn get(&self, kind: EngineKind) -> &dyn OcrEngine {
        match kind {
            EngineKind::Tesseract => &self.tesseract,
            EngineKind::EasyOcr => &self.easyocr,
            EngineKind::Unstructured => &self.unstructured,
        }
    }

    /// Unstructured also offers whole-document partitioning for PDFs.
    pub fn unstructured(&self) -> &UnstructuredEngine {
        &self.unstructured
    }
}
