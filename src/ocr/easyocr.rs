//! EasyOCR engine, hosted in a Python sidecar.
//!
//! The sidecar keeps a loaded EasyOCR reader per language set. Loading the
//! models takes seconds, so the reader is created once per process on first use
//! and shared afterwards. Requests against it are serialized through a mutex.

use super::{ExtractOptions, Extraction, OcrEngine, OcrInput};
use crate::config::EasyOcrSettings;
use crate::region::Region;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// Handle to a reader loaded inside the sidecar.
#[derive(Debug)]
pub struct EasyOcrReader {
    reader_id: String,
    languages: Vec<String>,
}

#[derive(Serialize)]
struct ReaderRequest<'a> {
    languages: &'a [String],
}

#[derive(Deserialize)]
struct ReaderResponse {
    reader_id: String,
}

/// One `readtext` result: quadrilateral, text, confidence (0-1).
#[derive(Debug, Deserialize)]
struct Detection(Vec<[f64; 2]>, String, f64);

pub struct EasyOcrEngine {
    url: String,
    languages: Vec<String>,
    client: reqwest::Client,
    reader: OnceCell<Mutex<EasyOcrReader>>,
}

impl EasyOcrEngine {
    pub fn new(settings: &EasyOcrSettings, client: reqwest::Client) -> Self {
        Self {
            url: settings.url.trim_end_matches('/').to_string(),
            languages: settings.languages.clone(),
            client,
            reader: OnceCell::new(),
        }
    }

    /// The shared reader, created on first call. A failed creation is not
    /// cached; the next request tries again.
    async fn reader(&self) -> Result<&Mutex<EasyOcrReader>> {
        self.reader
            .get_or_try_init(|| async {
                info!("EasyOcrEngine: loading reader for {:?}", self.languages);
                let resp = self
                    .client
                    .post(format!("{}/reader", self.url))
                    .json(&ReaderRequest {
                        languages: &self.languages,
                    })
                    .send()
                    .await
                    .context("EasyOCR sidecar unreachable")?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    anyhow::bail!("reader creation failed ({}): {}", status, text);
                }

                let created: ReaderResponse = resp.json().await?;
                info!("EasyOcrEngine: reader {} ready", created.reader_id);
                Ok::<_, anyhow::Error>(Mutex::new(EasyOcrReader {
                    reader_id: created.reader_id,
                    languages: self.languages.clone(),
                }))
            })
            .await
    }
}

#[async_trait::async_trait]
impl OcrEngine for EasyOcrEngine {
    fn name(&self) -> &str {
        "EasyOCR"
    }

    async fn recognize(&self, input: &OcrInput, _options: &ExtractOptions) -> Result<Extraction> {
        use reqwest::multipart::{Form, Part};

        let reader = self.reader().await?.lock().await;
        debug!(
            "EasyOcrEngine: readtext {} with reader {} ({:?})",
            input.filename, reader.reader_id, reader.languages
        );

        let part = Part::bytes(input.data.clone())
            .file_name(input.filename.clone())
            .mime_str(input.mime)?;
        let form = Form::new()
            .part("file", part)
            .text("reader_id", reader.reader_id.clone());

        let response = self
            .client
            .post(format!("{}/readtext", self.url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("sidecar error ({}): {}", status, error_text);
        }

        let body = response.text().await?;
        drop(reader);
        parse_readtext(&body)
    }
}

/// Normalize a `readtext` response: float quads truncated to integers, no
/// confidence filtering, texts joined by newlines.
pub fn parse_readtext(body: &str) -> Result<Extraction> {
    let detections: Vec<Detection> =
        serde_json::from_str(body).context("malformed readtext response")?;

    let mut texts = Vec::with_capacity(detections.len());
    let mut regions = Vec::with_capacity(detections.len());
    for Detection(points, text, confidence) in detections {
        if let Some(region) = Region::from_float_points(&points, text.as_str(), Some(confidence)) {
            regions.push(region);
        }
        texts.push(text);
    }

    Ok(Extraction {
        text: texts.join("\n"),
        regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Point;

    #[test]
    fn test_quads_truncated_in_order() {
        let body = r#"[
            [[[10.7, 5.2], [50.9, 8.0], [49.1, 30.99], [9.5, 28.4]], "rotated", 0.42],
            [[[0, 0], [5, 0], [5, 5], [0, 5]], "low but kept", 0.01]
        ]"#;
        let out = parse_readtext(body).unwrap();
        assert_eq!(out.text, "rotated\nlow but kept");
        assert_eq!(out.regions.len(), 2);
        assert_eq!(
            out.regions[0].points,
            vec![
                Point::new(10, 5),
                Point::new(50, 8),
                Point::new(49, 30),
                Point::new(9, 28)
            ]
        );
        assert_eq!(out.regions[1].confidence, Some(0.01));
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(parse_readtext("[]").unwrap(), Extraction::default());
    }

    #[test]
    fn test_malformed_response_is_an_error() {
        assert!(parse_readtext(r#"{"detail": "bad image"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_reports_inline_and_retries_init() {
        let engine = EasyOcrEngine::new(
            &EasyOcrSettings {
                url: "http://127.0.0.1:9".to_string(),
                languages: vec!["en".to_string()],
            },
            reqwest::Client::new(),
        );
        let input = OcrInput {
            filename: "a.png".to_string(),
            mime: "image/png",
            data: vec![1, 2, 3],
        };
        let out = super::super::extract(&engine, &input, &ExtractOptions::default()).await;
        assert!(out.text.starts_with("EasyOCR error: "));
        assert!(out.regions.is_empty());
        assert!(engine.reader.get().is_none());
    }
}
