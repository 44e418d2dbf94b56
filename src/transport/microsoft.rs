//! Outlook delivery — Microsoft Graph `sendMail` with fileAttachment parts.

use async_trait::async_trait;

use crate::config::OauthAppCredentials;
use crate::error::TransportError;
use crate::models::{Account, Provider};
use crate::transport::{OutgoingEmail, TokenPair, Transport, refresh_token_request};

const TOKEN_ENDPOINT: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const SEND_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/sendMail";

/// Sends through the Microsoft Graph API.
pub struct MicrosoftTransport {
    credentials: OauthAppCredentials,
    client: reqwest::Client,
}

impl MicrosoftTransport {
    pub fn new(credentials: OauthAppCredentials) -> Self {
        Self {
            credentials,
            client: reqwest::Client::new(),
        }
    }

    /// Build the Graph sendMail request body. Attachments ride along as
    /// inline fileAttachment resources referenced from the HTML by cid.
    fn send_mail_body(email: &OutgoingEmail) -> serde_json::Value {
        let attachments: Vec<serde_json::Value> = email
            .attachments
            .iter()
            .map(|att| {
                serde_json::json!({
                    "@odata.type": "#microsoft.graph.fileAttachment",
                    "name": att.filename,
                    "contentType": att.content_type,
                    "contentBytes": att.content_b64,
                    "contentId": att.content_id,
                    "isInline": true,
                })
            })
            .collect();

        serde_json::json!({
            "message": {
                "subject": email.subject,
                "body": {
                    "contentType": "HTML",
                    "content": email.html,
                },
                "toRecipients": [
                    { "emailAddress": { "address": email.to } }
                ],
                "attachments": attachments,
            },
            "saveToSentItems": true,
        })
    }
}

#[async_trait]
impl Transport for MicrosoftTransport {
    fn provider(&self) -> Provider {
        Provider::Outlook
    }

    /// A denial from the token endpoint downgrades to a warning and the send
    /// proceeds with the stored token; Graph rejects it on the send call if
    /// it has actually expired. Transport-level failures still abort.
    async fn refresh_credentials(
        &self,
        account: &Account,
    ) -> Result<Option<TokenPair>, TransportError> {
        match refresh_token_request(
            &self.client,
            Provider::Outlook,
            TOKEN_ENDPOINT,
            &self.credentials,
            &account.refresh_token,
        )
        .await
        {
            Ok(pair) => Ok(Some(pair)),
            Err(TransportError::RefreshFailed { provider, reason }) => {
                tracing::warn!(
                    provider = %provider,
                    reason = %reason,
                    "Token refresh failed, sending with existing token"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, account: &Account, email: &OutgoingEmail) -> Result<(), TransportError> {
        let body = Self::send_mail_body(email);

        let response = self
            .client
            .post(SEND_ENDPOINT)
            .bearer_auth(&account.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                provider: Provider::Outlook.to_string(),
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed {
                provider: Provider::Outlook.to_string(),
                reason: format!("{status}: {body}"),
            });
        }

        tracing::info!(to = %email.to, "Email sent via Microsoft Graph");
        Ok(())
    }
}
