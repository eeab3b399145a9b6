// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multimodal message-content assembly: resolving file references
//! (uploaded files or filesystem paths) into base64 data URLs.

use base64::Engine;
use kdeps_context::ExecutionContext;
use kdeps_error::{Error, ErrorCode};
use kdeps_llm_core::ir::{ContentPart, ImageUrl, MessageContent};

const SNIFF_LEN: usize = 512;

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if head.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("image/webp")
    } else if head.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        None
    }
}

fn detect_mime(name: &str, bytes: &[u8]) -> Result<String, Error> {
    let guessed = mime_guess::from_path(name).first();
    if let Some(mime) = guessed {
        if mime.type_() == mime_guess::mime::IMAGE {
            return Ok(mime.to_string());
        }
    }
    sniff_image_mime(bytes).map(str::to_string).ok_or_else(|| {
        Error::new(ErrorCode::LlmRequestBuildFailed, format!("'{name}' is not an image"))
            .with_context("file", name)
    })
}

async fn resolve_file_bytes(ctx: &ExecutionContext, file_ref: &str) -> Result<(String, Vec<u8>), Error> {
    if let Some(request) = ctx.request() {
        if file_ref == "file" {
            if let Some(file) = request.files.first() {
                return Ok((file.name.clone(), file.bytes.clone()));
            }
        } else if let Some(idx_str) = file_ref.strip_prefix("file[").and_then(|s| s.strip_suffix(']')) {
            if let Ok(idx) = idx_str.parse::<usize>() {
                if let Some(file) = request.files.get(idx) {
                    return Ok((file.name.clone(), file.bytes.clone()));
                }
            }
        } else if let Some(file) = request.files.iter().find(|f| f.name == file_ref) {
            return Ok((file.name.clone(), file.bytes.clone()));
        }
    }

    let path = ctx.fs_root().join(file_ref);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        Error::new(ErrorCode::LlmRequestBuildFailed, format!("could not read file '{file_ref}'"))
            .with_context("path", path.display().to_string())
            .with_source(e)
    })?;
    Ok((file_ref.to_string(), bytes))
}

/// Resolve every entry in `files` to a base64 data-URL image part.
pub async fn resolve_image_parts(
    ctx: &ExecutionContext,
    files: &[String],
) -> Result<Vec<ContentPart>, Error> {
    let mut parts = Vec::with_capacity(files.len());
    for file_ref in files {
        let (name, bytes) = resolve_file_bytes(ctx, file_ref).await?;
        let mime = detect_mime(&name, &bytes)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl { url: format!("data:{mime};base64,{encoded}") },
        });
    }
    Ok(parts)
}

/// Build the user turn's content: plain text when there are no attached
/// files, or a multimodal array with the prompt text first.
#[must_use]
pub fn build_content(prompt: String, image_parts: Vec<ContentPart>) -> MessageContent {
    if image_parts.is_empty() {
        return MessageContent::Text(prompt);
    }
    let mut parts = vec![ContentPart::Text { text: prompt }];
    parts.extend(image_parts);
    MessageContent::Parts(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdeps_context::{Request, UploadedFile};

    fn png_bytes() -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    #[test]
    fn sniff_detects_png_magic_bytes() {
        assert_eq!(sniff_image_mime(&png_bytes()), Some("image/png"));
    }

    #[test]
    fn sniff_rejects_non_image_bytes() {
        assert_eq!(sniff_image_mime(b"not an image"), None);
    }

    #[test]
    fn detect_mime_prefers_extension_when_it_is_an_image_type() {
        assert_eq!(detect_mime("a.png", &png_bytes()).unwrap(), "image/png");
    }

    #[test]
    fn detect_mime_falls_back_to_sniffing_unknown_extension() {
        assert_eq!(detect_mime("a.bin", &png_bytes()).unwrap(), "image/png");
    }

    #[test]
    fn detect_mime_rejects_non_image_content() {
        assert!(detect_mime("a.bin", b"plain text").is_err());
    }

    #[tokio::test]
    async fn resolve_file_bytes_finds_upload_by_exact_name() {
        let mut request = Request::default();
        request.files.push(UploadedFile { name: "a.png".into(), path: None, bytes: png_bytes() });
        let ctx = ExecutionContext::new("demo", "/tmp").with_request(request);
        let (name, bytes) = resolve_file_bytes(&ctx, "a.png").await.unwrap();
        assert_eq!(name, "a.png");
        assert_eq!(bytes, png_bytes());
    }

    #[tokio::test]
    async fn resolve_file_bytes_supports_file_shorthand() {
        let mut request = Request::default();
        request.files.push(UploadedFile { name: "first.png".into(), path: None, bytes: png_bytes() });
        let ctx = ExecutionContext::new("demo", "/tmp").with_request(request);
        let (name, _) = resolve_file_bytes(&ctx, "file").await.unwrap();
        assert_eq!(name, "first.png");
    }

    #[test]
    fn build_content_is_plain_text_without_images() {
        let content = build_content("hello".to_string(), vec![]);
        assert_eq!(content, MessageContent::Text("hello".to_string()));
    }

    #[test]
    fn build_content_puts_text_first_when_images_present() {
        let content = build_content(
            "describe".to_string(),
            vec![ContentPart::ImageUrl { image_url: ImageUrl { url: "data:image/png;base64,AA".into() } }],
        );
        match content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ContentPart::Text { .. }));
            }
            MessageContent::Text(_) => panic!("expected multimodal parts"),
        }
    }
}
