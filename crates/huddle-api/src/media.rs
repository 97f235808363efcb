use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use huddle_types::api::{Claims, MediaKind, UploadResponse};

use crate::AppState;

/// Accepted upload types: (content type, extension, kind).
const MEDIA_TYPES: &[(&str, &str, MediaKind)] = &[
    ("image/png", "png", MediaKind::Image),
    ("image/jpeg", "jpg", MediaKind::Image),
    ("image/gif", "gif", MediaKind::Image),
    ("image/webp", "webp", MediaKind::Image),
    ("audio/mpeg", "mp3", MediaKind::Audio),
    ("audio/ogg", "ogg", MediaKind::Audio),
    ("audio/wav", "wav", MediaKind::Audio),
    ("audio/webm", "weba", MediaKind::Audio),
    ("audio/mp4", "m4a", MediaKind::Audio),
];

fn by_content_type(content_type: &str) -> Option<(&'static str, MediaKind)> {
    // Drop parameters such as "; codecs=opus"
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    MEDIA_TYPES
        .iter()
        .find(|(ct, _, _)| *ct == essence)
        .map(|(_, ext, kind)| (*ext, *kind))
}

fn by_extension(ext: &str) -> Option<&'static str> {
    MEDIA_TYPES
        .iter()
        .find(|(_, e, _)| *e == ext)
        .map(|(ct, _, _)| *ct)
}

/// Only `<uuid>.<known ext>` names are served, which rules out path
/// traversal. Returns the content type.
fn parse_media_name(name: &str) -> Option<&'static str> {
    let (stem, ext) = name.split_once('.')?;
    stem.parse::<Uuid>().ok()?;
    by_extension(ext)
}

/// POST /media: raw image/audio bytes in, stable reference out.
pub async fn upload_media(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
    let (ext, kind) = by_content_type(content_type).ok_or(StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if bytes.len() > state.media.max_upload_bytes {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    tokio::fs::create_dir_all(&state.media.dir)
        .await
        .map_err(|e| {
            error!("Failed to create media directory {}: {}", state.media.dir.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let name = format!("{}.{}", Uuid::new_v4(), ext);
    let path = state.media.dir.join(&name);
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        error!("Failed to write media {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!(
        "Stored {} bytes of {} as {} (uploader: {})",
        bytes.len(),
        content_type,
        name,
        claims
            .as_ref()
            .map(|Extension(c)| c.username.as_str())
            .unwrap_or("anonymous")
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            reference: format!("/media/{}", name),
            kind,
            size: bytes.len() as u64,
        }),
    ))
}

/// GET /media/{name}: serve a stored blob.
pub async fn download_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let content_type = parse_media_name(&name).ok_or(StatusCode::BAD_REQUEST)?;

    let path = state.media.dir.join(&name);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StatusCode::NOT_FOUND
        } else {
            error!("Failed to read media {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
