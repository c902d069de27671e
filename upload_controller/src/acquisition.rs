use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Only used for logging, every modality goes through the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputModality {
    FilePicker,
    DragDrop,
    Paste,
    Camera,
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    File { path: PathBuf, mime: Option<String> },
    Bytes { data: Bytes, mime: String },
}

impl ImageSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageSource::File {
            path: path.into(),
            mime: None,
        }
    }

    pub fn file_with_mime(path: impl Into<PathBuf>, mime: impl Into<String>) -> Self {
        ImageSource::File {
            path: path.into(),
            mime: Some(mime.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime: String,
    pub data: Bytes,
}

impl ClipboardItem {
    pub fn new(mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime: mime.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasteEvent {
    pub items: Vec<ClipboardItem>,
}

impl PasteEvent {
    pub fn new(items: Vec<ClipboardItem>) -> Self {
        Self { items }
    }

    pub fn into_image(self) -> Option<ImageSource> {
        self.items
            .into_iter()
            .find(|item| is_image_mime(&item.mime))
            .map(|item| ImageSource::Bytes {
                data: item.data,
                mime: item.mime,
            })
    }
}

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("{0} is not an image")]
    NotAnImage(String),
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredImage {
    pub mime: String,
    pub data: Bytes,
}

impl AcquiredImage {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

// Host-reported type first, then the extension.
fn declared_file_mime(path: &Path, reported: Option<String>) -> Option<String> {
    reported
        .map(|mime| mime.trim().to_string())
        .filter(|mime| !mime.is_empty())
        .or_else(|| {
            mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
}

async fn read_file(path: &Path) -> Result<Vec<u8>, AcquisitionError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| AcquisitionError::Read {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn load_image(source: ImageSource) -> Result<AcquiredImage, AcquisitionError> {
    match source {
        ImageSource::File { path, mime } => match declared_file_mime(&path, mime) {
            Some(mime) => {
                if !is_image_mime(&mime) {
                    return Err(AcquisitionError::NotAnImage(path.display().to_string()));
                }
                let data = read_file(&path).await?;
                Ok(AcquiredImage {
                    mime,
                    data: Bytes::from(data),
                })
            }
            None => {
                let data = read_file(&path).await?;
                let format = image::guess_format(&data)
                    .map_err(|_| AcquisitionError::NotAnImage(path.display().to_string()))?;

                Ok(AcquiredImage {
                    mime: format.to_mime_type().to_string(),
                    data: Bytes::from(data),
                })
            }
        },
        ImageSource::Bytes { data, mime } => {
            if !is_image_mime(&mime) {
                return Err(AcquisitionError::NotAnImage(mime));
            }
            Ok(AcquiredImage {
                mime: mime.trim().to_string(),
                data,
            })
        }
    }
}
