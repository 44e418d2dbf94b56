//! Gmail delivery — raw RFC 2822 assembly and the `users.messages.send` API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::config::OauthAppCredentials;
use crate::error::TransportError;
use crate::models::{Account, Provider};
use crate::transport::{OutgoingEmail, TokenPair, Transport, refresh_token_request};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Sends through the Gmail API with a raw MIME payload.
pub struct GoogleTransport {
    credentials: OauthAppCredentials,
    client: reqwest::Client,
}

impl GoogleTransport {
    pub fn new(credentials: OauthAppCredentials) -> Self {
        Self {
            credentials,
            client: reqwest::Client::new(),
        }
    }

    /// Assemble the multipart/related MIME message Gmail expects in `raw`.
    ///
    /// The HTML body comes first, followed by one inline part per attachment,
    /// each addressable from the HTML through its `cid:` URL.
    fn build_raw_message(
        &self,
        account: &Account,
        email: &OutgoingEmail,
    ) -> Result<Vec<u8>, TransportError> {
        let from: Mailbox = account
            .email
            .parse()
            .map_err(|e| TransportError::InvalidMessage(format!("sender address: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| TransportError::InvalidMessage(format!("recipient address: {e}")))?;

        let mut multipart = MultiPart::related().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(email.html.clone()),
        );
        for att in &email.attachments {
            let bytes = BASE64_STANDARD.decode(&att.content_b64).map_err(|e| {
                TransportError::InvalidMessage(format!("attachment {}: {e}", att.content_id))
            })?;
            let content_type = ContentType::parse(&att.content_type).map_err(|e| {
                TransportError::InvalidMessage(format!("attachment {}: {e}", att.content_id))
            })?;
            multipart = multipart
                .singlepart(Attachment::new_inline(att.content_id.clone()).body(bytes, content_type));
        }

        // Gmail requires a From header in raw messages; the account address
        // is the authenticated sender.
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .multipart(multipart)
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

        Ok(message.formatted())
    }
}

#[async_trait]
impl Transport for GoogleTransport {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    /// Google refresh failures abort the send: an expired grant means every
    /// delivery from this account would bounce off the API anyway.
    async fn refresh_credentials(
        &self,
        account: &Account,
    ) -> Result<Option<TokenPair>, TransportError> {
        let pair = refresh_token_request(
            &self.client,
            Provider::Google,
            TOKEN_ENDPOINT,
            &self.credentials,
            &account.refresh_token,
        )
        .await?;
        Ok(Some(pair))
    }

    async fn send(&self, account: &Account, email: &OutgoingEmail) -> Result<(), TransportError> {
        let raw = self.build_raw_message(account, email)?;
        let encoded = URL_SAFE_NO_PAD.encode(&raw);

        let response = self
            .client
            .post(SEND_ENDPOINT)
            .bearer_auth(&account.access_token)
            .json(&serde_json::json!({ "raw": encoded }))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                provider: Provider::Google.to_string(),
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed {
                provider: Provider::Google.to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        tracing::info!(to = %email.to, "Email sent via Gmail API");
        Ok(())
    }
}
