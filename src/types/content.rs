//! Content items submitted for analysis.

use base64::Engine as _;
use bytes::Bytes;
use std::path::Path;

/// One uploaded payload (typically an image) in upload order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub data: Bytes,
    pub media_type: String,
    pub name: Option<String>,
}

impl ContentItem {
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let media_type = guess_media_type(path).unwrap_or_else(|| "application/octet-stream".into());
        let mut item = Self::new(bytes, media_type);
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            item = item.with_name(name);
        }
        Ok(item)
    }

    /// `data:` URL with base64 payload, as accepted by vision endpoints.
    pub fn data_url(&self) -> String {
        let data = base64::engine::general_purpose::STANDARD.encode(&self.data);
        format!("data:{};base64,{}", self.media_type, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for ContentItem {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

fn guess_media_type(path: &Path) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mt = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mt.to_string())
}
