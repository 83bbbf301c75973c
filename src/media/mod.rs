//! Shared media fetch/size-limit pipeline (spec.md §4.3).
//!
//! Consumed by driver send paths so every platform enforces the same size
//! cap and MIME handling instead of re-implementing it per driver.
//! Grounded on `examples/original_source/services/media.py`, with the
//! streaming-abort-on-oversize loop following the teacher's
//! `bytes_stream()` + `StreamExt::next()` idiom
//! (`src/gateway/providers.rs`).

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::message::{Attachment, AttachmentType};

/// Default cap when a caller doesn't specify one.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const GET_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK_SIZE_HINT: usize = 65536;

/// Fetched bytes plus the MIME type they were served/guessed as.
pub struct FetchedMedia {
    pub bytes: Bytes,
    pub mime: String,
}

/// `FetchAttachment(att, max_bytes) -> (bytes, mime) | none` from spec.md §4.3.
///
/// - If `att.data` is present: returns it directly (no network I/O) unless
///   it already exceeds `max_bytes`.
/// - Else if `att.url` is empty: returns `None`.
/// - Else: best-effort HEAD pre-flight (a HEAD failure does not abort the
///   fetch — falls through to GET, matching the Python `try/except: pass`),
///   then a streaming GET that aborts the moment the accumulated length
///   exceeds `max_bytes`.
pub async fn fetch_attachment(
    client: &reqwest::Client,
    att: &Attachment,
    max_bytes: usize,
) -> Option<FetchedMedia> {
    if let Some(data) = &att.data {
        if data.len() > max_bytes {
            tracing::debug!(
                name = %att.name,
                len = data.len(),
                max_bytes,
                "media: pre-fetched attachment exceeds size cap, skipping"
            );
            return None;
        }
        let mime = guess_mime_from_name(&att.name).unwrap_or_else(|| "application/octet-stream".to_string());
        return Some(FetchedMedia {
            bytes: Bytes::from(data.clone()),
            mime,
        });
    }

    fetch_url(client, &att.url, max_bytes).await
}

/// `fetch(url, max_bytes) -> (bytes, mime) | none`. The URL-only half of
/// `FetchAttachment`, split out so it can be reused directly (Python's
/// `media.fetch`).
pub async fn fetch_url(client: &reqwest::Client, url: &str, max_bytes: usize) -> Option<FetchedMedia> {
    if url.is_empty() {
        return None;
    }

    // Pre-flight HEAD to skip obviously oversized files without a GET.
    // A server that doesn't support HEAD (timeout, 404, 405) must not
    // abort the overall fetch.
    if let Ok(Ok(resp)) = tokio::time::timeout(HEAD_TIMEOUT, client.head(url).send()).await {
        if let Some(len) = resp.content_length() {
            if len as usize > max_bytes {
                tracing::debug!(url, content_length = len, max_bytes, "media: skipping oversized download");
                return None;
            }
        }
    }

    let resp = match tokio::time::timeout(GET_TIMEOUT, client.get(url).send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            tracing::error!(url, error = %e, "media: fetch failed");
            return None;
        }
        Err(_) => {
            tracing::error!(url, "media: fetch timed out");
            return None;
        }
    };

    if !resp.status().is_success() {
        tracing::error!(url, status = %resp.status(), "media: fetch returned error status");
        return None;
    }

    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut buf = BytesMut::with_capacity(CHUNK_SIZE_HINT.min(max_bytes + 1));
    let mut stream = resp.bytes_stream();

    let result = tokio::time::timeout(GET_TIMEOUT, async {
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(url, error = %e, "media: stream read error");
                    return None;
                }
            };
            buf.extend_from_slice(&chunk);
            if buf.len() > max_bytes {
                tracing::debug!(url, max_bytes, "media: download exceeded size cap, aborting");
                return None;
            }
        }
        Some(())
    })
    .await;

    match result {
        Ok(Some(())) => Some(FetchedMedia { bytes: buf.freeze(), mime }),
        Ok(None) => None,
        Err(_) => {
            tracing::error!(url, "media: stream timed out");
            None
        }
    }
}

const MIME_TO_EXT: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/aac", "aac"),
    ("audio/amr", "amr"),
];

const MIME_TO_DEFAULT_NAME: &[(&str, &str)] = &[
    ("image/jpeg", "photo.jpg"),
    ("image/png", "photo.png"),
    ("image/gif", "image.gif"),
    ("image/webp", "image.webp"),
    ("video/mp4", "video.mp4"),
    ("video/webm", "video.webm"),
    ("audio/ogg", "voice.ogg"),
    ("audio/mpeg", "audio.mp3"),
    ("audio/aac", "audio.aac"),
    ("audio/amr", "voice.amr"),
];

/// `FilenameFor(name_hint, mime)` from spec.md §4.3.
///
/// Returns `name_hint` unchanged unless it ends in `.tmp`, in which case
/// the extension is rewritten from `mime` (some platforms' CDNs — e.g.
/// Yunhu's — serve every image with a `.tmp` suffix). With no hint at all,
/// synthesizes a name from the MIME table, defaulting to `attachment.bin`.
pub fn filename_for(name_hint: &str, mime: &str) -> String {
    if !name_hint.is_empty() {
        if let Some(stem) = name_hint.strip_suffix(".tmp") {
            if let Some((_, ext)) = MIME_TO_EXT.iter().find(|(m, _)| *m == mime) {
                return format!("{stem}.{ext}");
            }
        }
        return name_hint.to_string();
    }
    MIME_TO_DEFAULT_NAME
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| "attachment.bin".to_string())
}

/// `MimeToAttType(mime)` from spec.md §4.3.
pub fn mime_to_attachment_type(mime: &str) -> AttachmentType {
    if let Some(sub) = mime.strip_prefix("image/") {
        let _ = sub;
        return AttachmentType::Image;
    }
    if mime.starts_with("video/") {
        return AttachmentType::Video;
    }
    if mime.starts_with("audio/") {
        return AttachmentType::Voice;
    }
    AttachmentType::File
}

/// Best-effort MIME guess from a filename's extension, used only for
/// pre-fetched (`att.data.is_some()`) attachments that skip network I/O.
fn guess_mime_from_name(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?.to_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "amr" => "audio/amr",
        _ => return None,
    };
    Some(mime.to_string())
}
