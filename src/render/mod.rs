//! Email content rendering — token substitution, inline images, background
//! wrapping, and file attachments.

mod assets;
mod inline;
mod template;

pub use assets::AssetStore;

use crate::models::{Lead, StepContent};

/// A prepared attachment, base64-encoded the way both provider APIs want it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    /// Filename shown to the recipient.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Base64-encoded file content.
    pub content_b64: String,
    /// Content ID referenced from the HTML via cid: URLs.
    pub content_id: String,
}

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Render step content for one lead: substitute tokens in subject and body,
/// inline local images, apply the background wrapper, and resolve file
/// attachments. Asset problems degrade to plain content rather than failing
/// the send.
pub async fn render(
    content: &StepContent,
    lead: &Lead,
    assets: &AssetStore,
    public_base_url: &str,
) -> RenderedEmail {
    let subject = template::substitute(&content.subject, lead, public_base_url);
    let body = template::substitute(&content.body, lead, public_base_url);

    let (mut html, mut attachments) = inline::extract_inline_images(&body, assets).await;

    if let Some(url) = &content.background_image {
        let (wrapped, background) = inline::apply_background(html, url, assets).await;
        html = wrapped;
        if let Some(att) = background {
            attachments.push(att);
        }
    }

    attachments.extend(inline::resolve_attachments(&content.attachments, assets).await);

    RenderedEmail {
        subject,
        html,
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentRef;

    #[tokio::test]
    async fn renders_plain_content_without_assets() {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetStore::new(dir.path());
        let lead = Lead::new("jane@acme.test").with_name("Jane Doe");
        let content = StepContent {
            subject: "Hi {{firstName}}".into(),
            body: "<p>Hello {{firstName}}</p>".into(),
            background_image: None,
            attachments: Vec::new(),
        };

        let email = render(&content, &lead, &assets, "http://localhost:8080").await;

        assert_eq!(email.subject, "Hi Jane");
        assert_eq!(email.html, "<p>Hello Jane</p>");
        assert!(email.attachments.is_empty());
    }

    #[tokio::test]
    async fn full_pipeline_inlines_background_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), b"logo").unwrap();
        std::fs::write(dir.path().join("bg.png"), b"bg").unwrap();
        std::fs::write(dir.path().join("deck.pdf"), b"pdf").unwrap();
        let assets = AssetStore::new(dir.path());

        let lead = Lead::new("jane@acme.test")
            .with_name("Jane Doe")
            .with_unsubscribe_token("tok_1");
        let content = StepContent {
            subject: "For {{company}}".into(),
            body: r#"<p>Hi {{firstName}}</p><img src="/uploads/logo.png">{{unsubscribe}}"#.into(),
            background_image: Some("/uploads/bg.png".into()),
            attachments: vec![AttachmentRef {
                name: "Deck.pdf".into(),
                url: "/uploads/deck.pdf".into(),
            }],
        };

        let email = render(&content, &lead, &assets, "http://localhost:8080").await;

        assert_eq!(email.subject, "For your company");
        assert!(email.html.contains("cid:img_logopng"));
        assert!(email.html.contains("background-image: url('cid:bg_bgpng')"));
        assert!(email.html.contains("unsubscribe?token=tok_1"));

        let cids: Vec<&str> = email
            .attachments
            .iter()
            .map(|a| a.content_id.as_str())
            .collect();
        assert_eq!(cids, vec!["img_logopng", "bg_bgpng", "att_deckpdf"]);
    }

    #[tokio::test]
    async fn rendering_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), b"logo").unwrap();
        let assets = AssetStore::new(dir.path());

        let lead = Lead::new("jane@acme.test").with_name("Jane Doe");
        let content = StepContent {
            subject: "Hi {{firstName}}".into(),
            body: r#"<p>Hi {{firstName}}</p><img src="/uploads/logo.png">"#.into(),
            background_image: None,
            attachments: Vec::new(),
        };

        let first = render(&content, &lead, &assets, "http://localhost:8080").await;
        let second = render(&content, &lead, &assets, "http://localhost:8080").await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_assets_degrade_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let assets = AssetStore::new(dir.path());
        let lead = Lead::new("jane@acme.test");
        let content = StepContent {
            subject: "Subject".into(),
            body: r#"<img src="/uploads/gone.png">"#.into(),
            background_image: Some("/uploads/gone-bg.png".into()),
            attachments: vec![AttachmentRef {
                name: "Gone.pdf".into(),
                url: "/uploads/gone.pdf".into(),
            }],
        };

        let email = render(&content, &lead, &assets, "http://localhost:8080").await;

        // Body keeps the original reference, no wrapper, no attachments
        assert_eq!(email.html, r#"<img src="/uploads/gone.png">"#);
        assert!(email.attachments.is_empty());
    }
}
