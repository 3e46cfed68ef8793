//! Multipart form reading shared by the upload endpoints

use axum::extract::Multipart;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::storage::file_extension;

/// Image extensions accepted for avatars and major images
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Largest avatar or major image
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Uploaded file part
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// All parts of a multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    /// Drain the request, keeping the part named `file_field` as the file
    pub async fn read(mut multipart: Multipart, file_field: &str, max_bytes: usize) -> ApiResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                if data.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File too large; the limit is {} bytes",
                        max_bytes
                    )));
                }
                form.file = Some(UploadedFile {
                    filename,
                    data: data.to_vec(),
                });
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }
        Ok(form)
    }

    /// Trimmed, non-empty text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn require_text(&self, name: &str) -> ApiResult<&str> {
        self.text(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Field '{}' is required", name)))
    }

    pub fn require_file(&mut self) -> ApiResult<UploadedFile> {
        match self.file.take() {
            Some(file) if !file.filename.is_empty() => Ok(file),
            _ => Err(ApiError::BadRequest("No file provided".to_string())),
        }
    }
}

/// Reject non-image uploads for avatar and major image endpoints
pub fn ensure_image(file: &UploadedFile) -> ApiResult<()> {
    let ext = file_extension(&file.filename);
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported image type; allowed: {}",
            IMAGE_EXTENSIONS.join(", ")
        )));
    }
    if file.data.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::PayloadTooLarge("Image must be at most 5 MiB".to_string()));
    }
    Ok(())
}

/// Tag list from an upload form: a JSON array, a JSON scalar, or plain text
pub fn parse_tags_field(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Ok(serde_json::Value::String(s)) => vec![s],
        Ok(serde_json::Value::Null) => Vec::new(),
        Ok(other) => vec![other.to_string()],
        Err(_) => vec![raw.to_string()],
    }
}

/// Comma-separated query value as a list
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| r.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_field() {
        assert_eq!(parse_tags_field(Some(r#"["exam", "2024"]"#)), vec!["exam", "2024"]);
        assert_eq!(parse_tags_field(Some(r#""notes""#)), vec!["notes"]);
        assert_eq!(parse_tags_field(Some("midterm")), vec!["midterm"]);
        assert_eq!(parse_tags_field(Some("[1, null]")), vec!["1"]);
        assert!(parse_tags_field(None).is_empty());
    }

    #[test]
    fn test_ensure_image() {
        let ok = UploadedFile {
            filename: "me.PNG".into(),
            data: vec![0; 10],
        };
        assert!(ensure_image(&ok).is_ok());
        let bad = UploadedFile {
            filename: "me.svg".into(),
            data: vec![],
        };
        assert!(matches!(ensure_image(&bad), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv(Some("a, b,,c")), vec!["a", " b", "", "c"]);
        assert!(split_csv(None).is_empty());
    }
}
