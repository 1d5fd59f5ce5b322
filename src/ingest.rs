//! Upload classification.

use crate::error::AppError;

/// An uploaded file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Png,
    Jpeg,
    Pdf,
}

impl FileKind {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }

    fn from_mime(mime: &str) -> Option<Self> {
        // Drop parameters such as `; charset=...`
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    fn from_extension(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl Upload {
    /// Classify by declared media type, falling back to the file extension
    /// when the type is missing or generic (`application/octet-stream`).
    pub fn classify(&self) -> Result<FileKind, AppError> {
        self.content_type
            .as_deref()
            .and_then(FileKind::from_mime)
            .or_else(|| FileKind::from_extension(&self.filename))
            .ok_or_else(|| {
                let declared = self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| self.filename.clone());
                AppError::UnsupportedType(declared)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, mime: Option<&str>) -> Upload {
        Upload {
            filename: name.to_string(),
            content_type: mime.map(str::to_string),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_classify_by_mime() {
        assert_eq!(upload("scan", Some("image/png")).classify().unwrap(), FileKind::Png);
        assert_eq!(
            upload("x.bin", Some("application/pdf")).classify().unwrap(),
            FileKind::Pdf
        );
    }

    #[test]
    fn test_classify_falls_back_to_extension() {
        assert_eq!(
            upload("Receipt.JPEG", Some("application/octet-stream")).classify().unwrap(),
            FileKind::Jpeg
        );
        assert_eq!(upload("doc.pdf", None).classify().unwrap(), FileKind::Pdf);
    }

    #[test]
    fn test_unsupported_types_rejected() {
        assert!(matches!(
            upload("slides.pptx", None).classify(),
            Err(AppError::UnsupportedType(_))
        ));
        assert!(upload("noext", None).classify().is_err());
    }
}
