//! Per-request orchestration: ingest, rasterize, extract, correlate, render.

use crate::config::Settings;
use crate::correlate::elements_for_page;
use crate::error::AppError;
use crate::ingest::{FileKind, Upload};
use crate::ocr::unstructured::{ElementRecord, PageElement};
use crate::ocr::{self, EngineKind, Engines, ExtractOptions, Extraction, OcrInput};
use crate::overlay::{encode_png, overlay, OverlayStyle};
use crate::pdf::{self, Rasterizer};
use crate::region::Region;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Result of one `/ocr` request.
#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub filename: String,
    pub engine: EngineKind,
    /// Only set for the Unstructured engine
    pub strategy: Option<&'static str>,
    pub content_hash: String,
    #[serde(flatten)]
    pub document: DocumentResult,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentResult {
    Image(ImageResult),
    Pdf(PdfResult),
}

#[derive(Debug, Serialize)]
pub struct ImageResult {
    pub width: u32,
    pub height: u32,
    pub text: String,
    pub regions: Vec<Region>,
    /// Base64 PNG with the region outlines drawn
    pub overlay_png: String,
}

#[derive(Debug, Serialize)]
pub struct PdfResult {
    pub page_count: u32,
    /// Whole-document text (or the engine's inline error)
    pub text: String,
    pub pages: Vec<PageResult>,
    /// Every analyzed element; empty for per-page engines
    pub elements: Vec<ElementRecord>,
}

#[derive(Debug, Serialize)]
pub struct PageResult {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub text: String,
    pub regions: Vec<Region>,
    /// Base64 PNG; the plain page when there was nothing to draw
    pub overlay_png: String,
    pub notice: Option<String>,
}

pub struct Pipeline {
    engines: Engines,
    rasterizer: Rasterizer,
    image_style: OverlayStyle,
    pdf_style: OverlayStyle,
}

impl Pipeline {
    pub fn new(settings: &Settings, client: reqwest::Client) -> Self {
        Self {
            engines: Engines::new(settings, client),
            rasterizer: Rasterizer::new(&settings.pdf),
            image_style: settings.image_style,
            pdf_style: settings.pdf_style,
        }
    }

    /// Process one upload with the selected engine.
    pub async fn run(
        &self,
        upload: &Upload,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<OcrResponse, AppError> {
        let kind = upload.classify()?;
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&upload.data);
            format!("{:x}", hasher.finalize())
        };
        info!(
            "Processing {} as {} with {} (sha256={})",
            upload.filename,
            kind.mime(),
            engine.as_str(),
            &content_hash[..12]
        );

        let document = if kind.is_image() {
            DocumentResult::Image(self.run_image(upload, kind, engine, options).await?)
        } else {
            DocumentResult::Pdf(self.run_pdf(upload, engine, options).await?)
        };

        Ok(OcrResponse {
            filename: upload.filename.clone(),
            engine,
            strategy: (engine == EngineKind::Unstructured).then(|| options.strategy.as_str()),
            content_hash,
            document,
        })
    }

    /// Image path, returning the overlay as PNG bytes rather than JSON.
    pub async fn overlay_png(
        &self,
        upload: &Upload,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<Vec<u8>, AppError> {
        let kind = upload.classify()?;
        if !kind.is_image() {
            return Err(AppError::BadRequest(
                "overlay.png accepts images only; use /ocr for PDFs".to_string(),
            ));
        }
        let (base, extraction) = self.extract_image(upload, kind, engine, options).await?;
        let rendered = overlay(&base, &extraction.regions, &self.image_style);
        Ok(encode_png(&rendered)?)
    }

    async fn run_image(
        &self,
        upload: &Upload,
        kind: FileKind,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<ImageResult, AppError> {
        let (base, extraction) = self.extract_image(upload, kind, engine, options).await?;
        let rendered = overlay(&base, &extraction.regions, &self.image_style);

        Ok(ImageResult {
            width: base.width(),
            height: base.height(),
            text: extraction.text,
            regions: extraction.regions,
            overlay_png: BASE64.encode(encode_png(&rendered)?),
        })
    }

    async fn extract_image(
        &self,
        upload: &Upload,
        kind: FileKind,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<(DynamicImage, Extraction), AppError> {
        let base = image::load_from_memory(&upload.data).map_err(|e| AppError::CorruptInput {
            kind: "image",
            reason: e.to_string(),
        })?;
        let input = OcrInput {
            filename: upload.filename.clone(),
            mime: kind.mime(),
            data: upload.data.clone(),
        };
        let extraction = ocr::extract(self.engines.get(engine), &input, &options).await;
        Ok((base, extraction))
    }

    async fn run_pdf(
        &self,
        upload: &Upload,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<PdfResult, AppError> {
        let page_count = pdf::page_count(&upload.data)?;
        let pages = self.rasterizer.render(&upload.data, page_count).await?;

        match engine {
            EngineKind::Unstructured => self.partition_pdf(upload, pages, options).await,
            _ => self.ocr_pages(upload, pages, engine, options).await,
        }
    }

    /// Whole-document partitioning, split back into pages by page number.
    async fn partition_pdf(
        &self,
        upload: &Upload,
        pages: Vec<DynamicImage>,
        options: ExtractOptions,
    ) -> Result<PdfResult, AppError> {
        let engine = self.engines.unstructured();
        let input = OcrInput {
            filename: upload.filename.clone(),
            mime: FileKind::Pdf.mime(),
            data: upload.data.clone(),
        };

        let partitioned = engine.partition(&input, options.strategy).await;
        if let Err(err) = &partitioned {
            warn!("Unstructured failed on {}: {:#}", upload.filename, err);
        }
        let (elements, text) = partition_outcome(ocr::OcrEngine::name(engine), partitioned);
        let results = correlated_pages(&elements, &pages, &self.pdf_style)?;

        Ok(PdfResult {
            page_count: pages.len() as u32,
            text,
            pages: results,
            elements: elements.iter().map(PageElement::record).collect(),
        })
    }

    /// Per-page OCR for engines that only understand images.
    async fn ocr_pages(
        &self,
        upload: &Upload,
        pages: Vec<DynamicImage>,
        engine: EngineKind,
        options: ExtractOptions,
    ) -> Result<PdfResult, AppError> {
        let engine = self.engines.get(engine);
        let mut results = Vec::with_capacity(pages.len());
        let mut texts = Vec::with_capacity(pages.len());

        for (index, image) in pages.iter().enumerate() {
            let page = index as u32 + 1;
            let input = OcrInput {
                filename: format!("{}#page-{}.png", upload.filename, page),
                mime: FileKind::Png.mime(),
                data: encode_png(image)?,
            };
            let extraction = ocr::extract(engine, &input, &options).await;
            let notice = extraction
                .regions
                .is_empty()
                .then(|| format!("No elements found on page {}", page));
            texts.push(extraction.text.clone());
            results.push(page_result(
                page,
                image,
                extraction.text,
                extraction.regions,
                notice,
                &self.pdf_style,
            )?);
        }

        Ok(PdfResult {
            page_count: pages.len() as u32,
            text: texts.join("\n\n"),
            pages: results,
            elements: Vec::new(),
        })
    }
}

/// Elements and whole-document text from a partition call. A failure becomes
/// the engine's inline error text with no elements.
fn partition_outcome(
    engine: &str,
    partitioned: anyhow::Result<Vec<PageElement>>,
) -> (Vec<PageElement>, String) {
    match partitioned {
        Ok(elements) => {
            let text = elements
                .iter()
                .map(|e| e.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            (elements, text)
        }
        Err(err) => (Vec::new(), Extraction::failed(engine, &err).text),
    }
}

/// Split whole-document elements back onto the rendered pages.
///
/// Page text includes every element on the page; only elements with a polygon
/// are drawn. A page with no elements keeps its plain image and gets a notice.
fn correlated_pages(
    elements: &[PageElement],
    pages: &[DynamicImage],
    style: &OverlayStyle,
) -> Result<Vec<PageResult>, AppError> {
    let mut results = Vec::with_capacity(pages.len());
    for (index, image) in pages.iter().enumerate() {
        let page = index as u32 + 1;
        let on_page = elements_for_page(elements, page);
        let regions: Vec<Region> = on_page
            .iter()
            .filter_map(|e| e.region_on(image.width(), image.height()))
            .collect();
        let text = on_page
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let notice = on_page
            .is_empty()
            .then(|| format!("No elements found on page {}", page));
        results.push(page_result(page, image, text, regions, notice, style)?);
    }
    Ok(results)
}

fn page_result(
    page: u32,
    image: &DynamicImage,
    text: String,
    regions: Vec<Region>,
    notice: Option<String>,
    style: &OverlayStyle,
) -> Result<PageResult, AppError> {
    // No regions: overlay() hands back an unmodified copy
    let rendered = overlay(image, &regions, style);
    Ok(PageResult {
        page,
        width: image.width(),
        height: image.height(),
        text,
        regions,
        overlay_png: BASE64.encode(encode_png(&rendered)?),
        notice,
    })
}
