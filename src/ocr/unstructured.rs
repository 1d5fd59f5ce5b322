//! Unstructured partition API engine (document partitioning / layout analysis).

use super::{ExtractOptions, Extraction, OcrEngine, OcrInput, Strategy};
use crate::config::UnstructuredSettings;
use crate::region::{truncate_points, Point, Region};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, info};

const PARTITION_PATH: &str = "/general/v0/general";

/// Size of the pixel space the engine measured coordinates in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSize {
    pub width: f64,
    pub height: f64,
}

/// One typed element produced by partitioning.
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    /// Element category, e.g. `Title`, `NarrativeText`, `Table`
    pub category: String,
    pub text: String,
    /// 1-based page number, when the engine reported one
    pub page: Option<u32>,
    /// Present only when the engine returned coordinate metadata
    pub polygon: Option<Vec<Point>>,
    pub layout: Option<LayoutSize>,
}

/// JSON listing entry for every analyzed element of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementRecord {
    pub page: Option<u32>,
    #[serde(rename = "type")]
    pub category: String,
    pub text: String,
}

impl PageElement {
    /// Region in the engine's own pixel space.
    pub fn region(&self) -> Option<Region> {
        Region::new(self.polygon.clone()?, self.text.as_str(), None)
    }

    /// Region rescaled onto an image of `width` x `height` pixels. Falls back
    /// to the engine's coordinates when no layout size was reported.
    pub fn region_on(&self, width: u32, height: u32) -> Option<Region> {
        let polygon = self.polygon.as_ref()?;
        let Some(layout) = self.layout.filter(|l| l.width > 0.0 && l.height > 0.0) else {
            return self.region();
        };
        let sx = width as f64 / layout.width;
        let sy = height as f64 / layout.height;
        let scaled: Vec<[f64; 2]> = polygon
            .iter()
            .map(|p| [p.x as f64 * sx, p.y as f64 * sy])
            .collect();
        Region::new(truncate_points(&scaled)?, self.text.as_str(), None)
    }

    pub fn record(&self) -> ElementRecord {
        ElementRecord {
            page: self.page,
            category: self.category.clone(),
            text: self.text.clone(),
        }
    }
}

// ── Unstructured API response types ─────────────────────────────────────────

#[derive(Deserialize)]
struct RawElement {
    #[serde(rename = "type", default)]
    category: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Deserialize, Default)]
struct RawMetadata {
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    coordinates: Option<RawCoordinates>,
}

#[derive(Deserialize)]
struct RawCoordinates {
    #[serde(default)]
    points: Vec<[f64; 2]>,
    #[serde(default)]
    layout_width: Option<f64>,
    #[serde(default)]
    layout_height: Option<f64>,
}

impl From<RawElement> for PageElement {
    fn from(raw: RawElement) -> Self {
        let (polygon, layout) = match raw.metadata.coordinates {
            Some(coords) => {
                let layout = match (coords.layout_width, coords.layout_height) {
                    (Some(width), Some(height)) => Some(LayoutSize { width, height }),
                    _ => None,
                };
                (truncate_points(&coords.points), layout)
            }
            None => (None, None),
        };
        Self {
            category: raw.category,
            text: raw.text,
            page: raw.metadata.page_number,
            polygon,
            layout,
        }
    }
}

/// Parse a partition response into elements, in emission order.
pub fn parse_elements(body: &str) -> Result<Vec<PageElement>> {
    let raw: Vec<RawElement> =
        serde_json::from_str(body).context("malformed partition response")?;
    Ok(raw.into_iter().map(PageElement::from).collect())
}

/// Single-image policy: only elements that yield a polygon contribute a
/// region, and only those contribute text. With the decoded image size,
/// polygons are rescaled from the engine's layout onto the image.
pub fn image_extraction(elements: &[PageElement], image_size: Option<(u32, u32)>) -> Extraction {
    let mut texts = Vec::new();
    let mut regions = Vec::new();
    for element in elements {
        let region = match image_size {
            Some((width, height)) => element.region_on(width, height),
            None => element.region(),
        };
        if let Some(region) = region {
            texts.push(element.text.clone());
            regions.push(region);
        }
    }
    Extraction {
        text: texts.join("\n"),
        regions,
    }
}

pub struct UnstructuredEngine {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl UnstructuredEngine {
    pub fn new(settings: &UnstructuredSettings, client: reqwest::Client) -> Self {
        Self {
            url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
        }
    }

    /// Partition a whole file (image or PDF) into typed elements.
    pub async fn partition(&self, input: &OcrInput, strategy: Strategy) -> Result<Vec<PageElement>> {
        use reqwest::multipart::{Form, Part};

        info!(
            "UnstructuredEngine: partitioning {} ({} bytes, strategy={})",
            input.filename,
            input.data.len(),
            strategy.as_str()
        );

        let part = Part::bytes(input.data.clone())
            .file_name(input.filename.clone())
            .mime_str(input.mime)?;
        let form = Form::new()
            .part("files", part)
            .text("strategy", strategy.as_str())
            .text("coordinates", "true");

        let mut request = self
            .client
            .post(format!("{}{}", self.url, PARTITION_PATH))
            .header("accept", "application/json")
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("unstructured-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("partition API error ({}): {}", status, error_text);
        }

        let body = response.text().await?;
        let elements = parse_elements(&body)?;
        debug!(
            "UnstructuredEngine: {} element(s), {} with coordinates",
            elements.len(),
            elements.iter().filter(|e| e.polygon.is_some()).count()
        );
        Ok(elements)
    }
}

#[async_trait::async_trait]
impl OcrEngine for UnstructuredEngine {
    fn name(&self) -> &str {
        "Unstructured"
    }

    async fn recognize(&self, input: &OcrInput, options: &ExtractOptions) -> Result<Extraction> {
        let elements = self.partition(input, options.strategy).await?;
        let image_size = image::io::Reader::new(Cursor::new(&input.data))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());
        Ok(image_extraction(&elements, image_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"[
        {"type": "Title", "element_id": "a1", "text": "Quarterly Report",
         "metadata": {"page_number": 1, "filename": "r.pdf",
                      "coordinates": {"points": [[100.4, 50.9], [100.4, 90.2], [700.8, 90.2], [700.8, 50.9]],
                                      "system": "PixelSpace", "layout_width": 1700, "layout_height": 2200}}},
        {"type": "NarrativeText", "element_id": "a2", "text": "No coordinates here",
         "metadata": {"page_number": 1}},
        {"type": "Table", "element_id": "a3", "text": "a b c",
         "metadata": {"page_number": 2,
                      "coordinates": {"points": [[0, 0], [10, 0], [10, 10], [0, 10]]}}}
    ]"#;

    #[test]
    fn test_parse_elements_keeps_optional_polygon() {
        let elements = parse_elements(RESPONSE).unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].category, "Title");
        assert_eq!(
            elements[0].polygon.as_deref(),
            Some(
                &[
                    Point::new(100, 50),
                    Point::new(100, 90),
                    Point::new(700, 90),
                    Point::new(700, 50)
                ][..]
            )
        );
        assert_eq!(
            elements[0].layout,
            Some(LayoutSize { width: 1700.0, height: 2200.0 })
        );
        assert!(elements[1].polygon.is_none());
        assert_eq!(elements[2].page, Some(2));
        assert!(elements[2].layout.is_none());
    }

    #[test]
    fn test_image_policy_uses_only_elements_with_polygons() {
        let elements = parse_elements(RESPONSE).unwrap();
        let out = image_extraction(&elements, None);
        assert_eq!(out.text, "Quarterly Report\na b c");
        assert_eq!(out.regions.len(), 2);
        assert!(!out.text.contains("No coordinates"));
    }

    #[test]
    fn test_image_policy_rescales_to_decoded_size() {
        let elements = parse_elements(RESPONSE).unwrap();
        let out = image_extraction(&elements, Some((850, 1100)));
        assert_eq!(out.regions.len(), 2);
        assert_eq!(out.regions[0].points[0], Point::new(50, 25));
        assert_eq!(out.regions[0].points[2], Point::new(350, 45));
        // No layout size reported: left in engine coordinates
        assert_eq!(out.regions[1].points[2], Point::new(10, 10));
    }

    #[test]
    fn test_region_on_rescales_to_page_image() {
        let elements = parse_elements(RESPONSE).unwrap();
        // Page rendered at half the engine's resolution
        let region = elements[0].region_on(850, 1100).unwrap();
        assert_eq!(region.points[0], Point::new(50, 25));
        assert_eq!(region.points[2], Point::new(350, 45));
        // No layout size: coordinates used as-is
        let table = elements[2].region_on(5000, 5000).unwrap();
        assert_eq!(table.points[2], Point::new(10, 10));
        assert!(elements[1].region_on(850, 1100).is_none());
    }

    #[test]
    fn test_records_for_listing() {
        let elements = parse_elements(RESPONSE).unwrap();
        let json = serde_json::to_value(elements[1].record()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"page": 1, "type": "NarrativeText", "text": "No coordinates here"})
        );
    }

    #[test]
    fn test_empty_partition() {
        let elements = parse_elements("[]").unwrap();
        assert_eq!(image_extraction(&elements, Some((10, 10))), Extraction::default());
    }
}
