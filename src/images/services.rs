use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Image payload decoded from a `data:image/...;base64,` string.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("Expected a base64 data URI, e.g. data:image/png;base64,...")]
    NotDataUri,
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("Image data is not valid base64.")]
    InvalidBase64,
    #[error("Image is empty.")]
    Empty,
}

pub fn decode_data_uri(raw: &str) -> Result<UploadItem, ImageError> {
    let rest = raw.trim().strip_prefix("data:").ok_or(ImageError::NotDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(ImageError::NotDataUri)?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or(ImageError::NotDataUri)?
        .to_ascii_lowercase();
    if ext_from_mime(&content_type).is_none() {
        return Err(ImageError::UnsupportedType(content_type));
    }
    let body = STANDARD
        .decode(payload.trim())
        .map_err(|_| ImageError::InvalidBase64)?;
    if body.is_empty() {
        return Err(ImageError::Empty);
    }
    Ok(UploadItem {
        body: Bytes::from(body),
        content_type,
    })
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Upload under `<prefix>/<uuid>.<ext>` and return the object key.
pub async fn store_image(st: &AppState, prefix: &str, img: UploadItem) -> anyhow::Result<String> {
    let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
    let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, img.body, &img.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "image stored");
    Ok(key)
}

/// Remove an object that is no longer referenced. Failures only leave garbage behind.
pub async fn discard_image(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete image object");
    }
}

pub async fn presign(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, st.config.storage.url_ttl_secs)
        .await
        .with_context(|| format!("presign url for key {}", key))
}

pub async fn presign_opt(st: &AppState, key: Option<&str>) -> anyhow::Result<Option<String>> {
    match key {
        Some(k) if !k.is_empty() => Ok(Some(presign(st, k).await?)),
        _ => Ok(None),
    }
}
