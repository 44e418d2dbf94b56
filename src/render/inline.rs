//! Inline image handling — cid rewriting, background wrapping, and file
//! attachments pulled from the upload directory.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use regex::Regex;

use crate::models::AttachmentRef;
use crate::render::EmailAttachment;
use crate::render::assets::AssetStore;

/// Matches img tags, capturing the src URL.
static IMG_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]+src="([^">]+)""#).unwrap());

/// Build a content ID from a prefix and filename, keeping only ASCII
/// alphanumerics so the ID survives every mail client.
fn content_id(prefix: &str, filename: &str) -> String {
    let stripped: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{prefix}{stripped}")
}

/// Lowercased extension of a filename, without the dot.
fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Content type for an inline image, by extension.
fn image_content_type(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Content type for a background image. Anything that isn't a png is
/// treated as jpeg.
fn background_content_type(filename: &str) -> &'static str {
    if extension_of(filename) == "png" {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Content type for a file attachment, by extension.
fn file_content_type(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Scan HTML for img tags pointing at local uploads, rewrite their src to
/// cid: references, and collect the image bytes as inline attachments.
///
/// The same file referenced twice is attached once but rewritten everywhere.
/// References whose file is missing from disk are left untouched.
pub async fn extract_inline_images(
    html: &str,
    assets: &AssetStore,
) -> (String, Vec<EmailAttachment>) {
    let mut rewritten = html.to_string();
    let mut attachments: Vec<EmailAttachment> = Vec::new();

    for caps in IMG_SRC_RE.captures_iter(html) {
        let Some(url) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if !AssetStore::is_local_reference(url) {
            continue;
        }

        let filename = AssetStore::filename_of(url);
        let Some(bytes) = assets.read(filename).await else {
            continue;
        };

        let cid = content_id("img_", filename);
        if !attachments.iter().any(|a| a.content_id == cid) {
            attachments.push(EmailAttachment {
                filename: filename.to_string(),
                content_type: image_content_type(filename).to_string(),
                content_b64: BASE64_STANDARD.encode(&bytes),
                content_id: cid.clone(),
            });
        }

        rewritten = rewritten.replace(url, &format!("cid:{cid}"));
    }

    (rewritten, attachments)
}

/// Wrap HTML in a div styled with a cid background image. Returns the
/// wrapped HTML and the background attachment, or the HTML unchanged when
/// the file is missing.
pub async fn apply_background(
    html: String,
    url: &str,
    assets: &AssetStore,
) -> (String, Option<EmailAttachment>) {
    let filename = AssetStore::filename_of(url);
    let Some(bytes) = assets.read(filename).await else {
        return (html, None);
    };

    let cid = content_id("bg_", filename);
    let attachment = EmailAttachment {
        filename: filename.to_string(),
        content_type: background_content_type(filename).to_string(),
        content_b64: BASE64_STANDARD.encode(&bytes),
        content_id: cid.clone(),
    };

    let wrapped = format!(
        r#"<div style="background-image: url('cid:{cid}'); background-size: cover; background-position: center; padding: 40px; min-height: 400px;">
    <div style="background: rgba(255,255,255,0.9); padding: 30px; border-radius: 8px; max-width: 600px; margin: 0 auto;">
        {html}
    </div>
</div>"#
    );

    (wrapped, Some(attachment))
}

/// Resolve step file attachments from the upload directory. The MIME
/// filename is the display name; the cid and content type come from the
/// stored filename. Missing files are skipped.
pub async fn resolve_attachments(
    refs: &[AttachmentRef],
    assets: &AssetStore,
) -> Vec<EmailAttachment> {
    let mut attachments = Vec::new();
    for att in refs {
        let local_filename = AssetStore::filename_of(&att.url);
        let Some(bytes) = assets.read(local_filename).await else {
            tracing::warn!(name = %att.name, url = %att.url, "Attachment file missing, skipping");
            continue;
        };
        attachments.push(EmailAttachment {
            filename: att.name.clone(),
            content_type: file_content_type(local_filename).to_string(),
            content_b64: BASE64_STANDARD.encode(&bytes),
            content_id: content_id("att_", local_filename),
        });
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_dir() -> (tempfile::TempDir, AssetStore) {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetStore::new(dir.path());
        (dir, assets)
    }

    #[test]
    fn content_id_strips_non_alphanumerics() {
        assert_eq!(content_id("img_", "logo-v2.png"), "img_logov2png");
        assert_eq!(content_id("bg_", "hero image.jpg"), "bg_heroimagejpg");
        assert_eq!(content_id("att_", "deck_final.pdf"), "att_deckfinalpdf");
    }

    #[test]
    fn image_content_types_by_extension() {
        assert_eq!(image_content_type("a.png"), "image/png");
        assert_eq!(image_content_type("a.jpg"), "image/jpeg");
        assert_eq!(image_content_type("a.jpeg"), "image/jpeg");
        assert_eq!(image_content_type("a.gif"), "image/gif");
        assert_eq!(image_content_type("a.webp"), "application/octet-stream");
        // Extensions are matched case-insensitively
        assert_eq!(image_content_type("a.PNG"), "image/png");
    }

    #[test]
    fn background_content_type_defaults_to_jpeg() {
        assert_eq!(background_content_type("bg.png"), "image/png");
        assert_eq!(background_content_type("bg.jpg"), "image/jpeg");
        assert_eq!(background_content_type("bg.webp"), "image/jpeg");
    }

    #[test]
    fn file_content_types_by_extension() {
        assert_eq!(file_content_type("deck.pdf"), "application/pdf");
        assert_eq!(
            file_content_type("notes.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(file_content_type("data.csv"), "application/octet-stream");
    }

    #[tokio::test]
    async fn extracts_and_rewrites_local_images() {
        let (dir, assets) = asset_dir();
        std::fs::write(dir.path().join("logo.png"), b"fake png").unwrap();

        let html = r#"<p>Hi</p><img alt="logo" src="http://localhost:8080/uploads/logo.png">"#;
        let (rewritten, attachments) = extract_inline_images(html, &assets).await;

        assert!(rewritten.contains(r#"src="cid:img_logopng""#));
        assert!(!rewritten.contains("/uploads/"));
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].content_id, "img_logopng");
        assert_eq!(attachments[0].content_type, "image/png");
        assert_eq!(attachments[0].content_b64, BASE64_STANDARD.encode(b"fake png"));
    }

    #[tokio::test]
    async fn duplicate_image_attached_once_rewritten_everywhere() {
        let (dir, assets) = asset_dir();
        std::fs::write(dir.path().join("logo.png"), b"fake png").unwrap();

        let html = r#"<img src="/uploads/logo.png"><img src="/uploads/logo.png">"#;
        let (rewritten, attachments) = extract_inline_images(html, &assets).await;

        assert_eq!(attachments.len(), 1);
        assert_eq!(rewritten.matches("cid:img_logopng").count(), 2);
    }

    #[tokio::test]
    async fn external_images_left_alone() {
        let (_dir, assets) = asset_dir();
        let html = r#"<img src="https://cdn.example.com/banner.png">"#;
        let (rewritten, attachments) = extract_inline_images(html, &assets).await;

        assert_eq!(rewritten, html);
        assert!(attachments.is_empty());
    }

    #[tokio::test]
    async fn missing_image_left_untouched() {
        let (_dir, assets) = asset_dir();
        let html = r#"<img src="/uploads/gone.png">"#;
        let (rewritten, attachments) = extract_inline_images(html, &assets).await;

        assert_eq!(rewritten, html);
        assert!(attachments.is_empty());
    }

    #[tokio::test]
    async fn background_wraps_html() {
        let (dir, assets) = asset_dir();
        std::fs::write(dir.path().join("hero.jpg"), b"fake jpg").unwrap();

        let (wrapped, attachment) =
            apply_background("<p>Body</p>".to_string(), "/uploads/hero.jpg", &assets).await;

        let attachment = attachment.unwrap();
        assert_eq!(attachment.content_id, "bg_herojpg");
        assert_eq!(attachment.content_type, "image/jpeg");
        assert!(wrapped.contains("background-image: url('cid:bg_herojpg')"));
        assert!(wrapped.contains("background-size: cover"));
        assert!(wrapped.contains("rgba(255,255,255,0.9)"));
        assert!(wrapped.contains("<p>Body</p>"));
    }

    #[tokio::test]
    async fn missing_background_skipped() {
        let (_dir, assets) = asset_dir();
        let (html, attachment) =
            apply_background("<p>Body</p>".to_string(), "/uploads/gone.jpg", &assets).await;

        assert_eq!(html, "<p>Body</p>");
        assert!(attachment.is_none());
    }

    #[tokio::test]
    async fn attachments_use_display_name_and_local_cid() {
        let (dir, assets) = asset_dir();
        std::fs::write(dir.path().join("a1b2c3.pdf"), b"pdf bytes").unwrap();

        let refs = vec![
            AttachmentRef {
                name: "Pitch Deck.pdf".into(),
                url: "/uploads/a1b2c3.pdf".into(),
            },
            AttachmentRef {
                name: "Missing.docx".into(),
                url: "/uploads/gone.docx".into(),
            },
        ];
        let attachments = resolve_attachments(&refs, &assets).await;

        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "Pitch Deck.pdf");
        assert_eq!(attachments[0].content_type, "application/pdf");
        assert_eq!(attachments[0].content_id, "att_a1b2c3pdf");
    }
}
