//! Tesseract OCR engine (runs the `tesseract` CLI, TSV output).

use super::{ExtractOptions, Extraction, OcrEngine, OcrInput};
use crate::config::TesseractSettings;
use crate::region::Region;
use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// TSV row level for individual words.
const WORD_LEVEL: u32 = 5;

pub struct TesseractEngine {
    command: String,
    languages: String,
    min_confidence: f64,
}

impl TesseractEngine {
    pub fn new(settings: &TesseractSettings) -> Self {
        Self {
            command: settings.command.clone(),
            languages: settings.languages.clone(),
            min_confidence: settings.min_confidence,
        }
    }

    async fn run_tsv(&self, data: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.command)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run {} (is it installed?)", self.command))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        let payload = data.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for tesseract")?;
        let written = writer.await.context("tesseract stdin writer panicked")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }
        written.context("failed to send image to tesseract")?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "Tesseract"
    }

    async fn recognize(&self, input: &OcrInput, _options: &ExtractOptions) -> Result<Extraction> {
        debug!(
            "TesseractEngine: {} ({} bytes, lang={})",
            input.filename,
            input.data.len(),
            self.languages
        );
        let tsv = self.run_tsv(&input.data).await?;
        Ok(parse_tsv(&tsv, self.min_confidence))
    }
}

/// Turn Tesseract TSV into regions and joined text.
///
/// Only word rows survive, and only those with confidence strictly above
/// `min_confidence` and non-blank text. Words of one Tesseract line are joined
/// by spaces, lines by newlines.
pub fn parse_tsv(tsv: &str, min_confidence: f64) -> Extraction {
    let mut text = String::new();
    let mut regions = Vec::new();
    let mut current_line: Option<(u32, u32, u32, u32)> = None;

    // First row is the header
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<i64>().unwrap_or(0);

        if num(0) != WORD_LEVEL as i64 {
            continue;
        }
        let conf: f64 = cols[10].trim().parse().unwrap_or(-1.0);
        let word = cols[11].trim();
        if conf <= min_confidence || word.is_empty() {
            continue;
        }

        let Some(region) = Region::from_rect(
            num(6) as i32,
            num(7) as i32,
            num(8) as i32,
            num(9) as i32,
            word,
            Some(conf),
        ) else {
            continue;
        };

        let line = (num(1) as u32, num(2) as u32, num(3) as u32, num(4) as u32);
        if !text.is_empty() {
            text.push(if current_line == Some(line) { ' ' } else { '\n' });
        }
        text.push_str(word);
        current_line = Some(line);
        regions.push(region);
    }

    Extraction { text, regions }
}
