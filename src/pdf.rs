//! PDF page counting (lopdf) and rasterization (poppler's `pdftoppm`).

use crate::config::PdfSettings;
use crate::error::AppError;
use anyhow::Context;
use image::DynamicImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Number of pages, validating that the bytes parse as a PDF.
pub fn page_count(data: &[u8]) -> Result<u32, AppError> {
    use lopdf::Document;
    use std::io::Cursor;

    let doc = Document::load_from(Cursor::new(data)).map_err(|e| AppError::CorruptInput {
        kind: "PDF",
        reason: e.to_string(),
    })?;
    let pages = doc.get_pages().len() as u32;
    if pages == 0 {
        return Err(AppError::CorruptInput {
            kind: "PDF",
            reason: "document has no pages".to_string(),
        });
    }
    Ok(pages)
}

/// Renders PDF pages to images through an external `pdftoppm` process.
pub struct Rasterizer {
    command: String,
    dpi: u32,
}

impl Rasterizer {
    pub fn new(settings: &PdfSettings) -> Self {
        Self {
            command: settings.pdftoppm.clone(),
            dpi: settings.dpi,
        }
    }

    /// Render pages `1..=pages` in order. Work files live in a per-call
    /// temporary directory that is removed afterwards.
    pub async fn render(&self, data: &[u8], pages: u32) -> Result<Vec<DynamicImage>, AppError> {
        let dir = std::env::temp_dir().join(format!("ocr-overlay-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create work dir {:?}", dir))
            .map_err(|e| AppError::Environment(format!("{:#}", e)))?;

        let result = self.render_in(&dir, data, pages).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!("Failed to clean up {:?}: {}", dir, e);
        }
        result
    }

    async fn render_in(&self, dir: &Path, data: &[u8], pages: u32) -> Result<Vec<DynamicImage>, AppError> {
        let input = dir.join("input.pdf");
        tokio::fs::write(&input, data)
            .await
            .map_err(|e| AppError::Environment(format!("Failed to write {:?}: {}", input, e)))?;

        info!("Rasterizing {} page(s) at {} dpi", pages, self.dpi);
        let mut images = Vec::with_capacity(pages as usize);
        for page in 1..=pages {
            let path = self.render_page(&input, dir, page).await?;
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| AppError::Environment(format!("Missing output for page {}: {}", page, e)))?;
            let image = image::load_from_memory(&bytes).map_err(|e| AppError::CorruptInput {
                kind: "rendered page",
                reason: e.to_string(),
            })?;
            debug!("Page {}: {}x{}", page, image.width(), image.height());
            images.push(image);
        }
        Ok(images)
    }

    async fn render_page(&self, input: &Path, dir: &Path, page: u32) -> Result<PathBuf, AppError> {
        let root = dir.join(format!("page-{}", page));
        let output = Command::new(&self.command)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(input)
            .arg(&root)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => AppError::Environment(format!(
                    "{} not found; install poppler-utils to process PDFs",
                    self.command
                )),
                _ => AppError::Environment(format!("Failed to run {}: {}", self.command, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Environment(format!(
                "{} failed on page {} ({}): {}",
                self.command,
                page,
                output.status,
                stderr.trim()
            )));
        }
        Ok(root.with_extension("png"))
    }
}
