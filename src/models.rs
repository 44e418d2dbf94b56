//! Campaign domain model — accounts, campaigns, sequence steps, A/B variants, and leads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mailbox provider an account is connected through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Gmail via the Gmail REST API.
    Google,
    /// Outlook via the Microsoft Graph API.
    Outlook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Outlook => "outlook",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "outlook" => Ok(Self::Outlook),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// A connected sending mailbox with its OAuth tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID.
    pub id: Uuid,
    /// Mailbox address emails are sent from.
    pub email: String,
    /// Which provider this mailbox lives on.
    pub provider: Provider,
    /// Current OAuth access token.
    pub access_token: String,
    /// Long-lived OAuth refresh token.
    pub refresh_token: String,
    /// Whether the OAuth connection is currently usable.
    pub is_connected: bool,
    /// When the account was connected.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new connected account.
    pub fn new(
        email: impl Into<String>,
        provider: Provider,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            provider,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            is_connected: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Being edited, not yet sending.
    Draft,
    /// Picked up by the dispatcher every tick.
    Active,
    /// Temporarily stopped by the user.
    Paused,
    /// All leads have finished the sequence.
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown campaign status: {}", s)),
        }
    }
}

/// A multi-step outreach campaign bound to one sending account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique campaign ID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current lifecycle status.
    pub status: CampaignStatus,
    /// Sending account, if one has been attached.
    pub account_id: Option<Uuid>,
    /// Emails sent across all leads.
    pub total_sent: i64,
    /// Opens recorded across all leads.
    pub total_opened: i64,
    /// Replies recorded across all leads.
    pub total_replied: i64,
    /// Sequence steps, ordered by step_order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    /// When the campaign was created.
    pub created_at: DateTime<Utc>,
    /// When the campaign was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new draft campaign with no steps.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: CampaignStatus::Draft,
            account_id: None,
            total_sent: 0,
            total_opened: 0,
            total_replied: 0,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the sending account.
    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Set the lifecycle status.
    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }
}

/// A file attached to a step — display name plus the upload URL it was stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Name shown to the recipient.
    pub name: String,
    /// Upload URL the file content lives behind.
    pub url: String,
}

/// The renderable content of a step or variant.
#[derive(Debug, Clone)]
pub struct StepContent {
    pub subject: String,
    pub body: String,
    pub background_image: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

/// One email in a campaign sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step ID.
    pub id: Uuid,
    /// Campaign this step belongs to.
    pub campaign_id: Uuid,
    /// Position in the sequence (ascending).
    pub step_order: i64,
    /// Subject template with {{token}} placeholders.
    pub subject: String,
    /// HTML body template with {{token}} placeholders.
    pub body: String,
    /// Optional background image upload URL.
    pub background_image: Option<String>,
    /// File attachments to include.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    /// Days to wait after the previous step before this one is due.
    pub delay_days: i64,
    /// A/B variants competing with this step's own content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl Step {
    /// Create a step with default delay and no variants.
    pub fn new(
        campaign_id: Uuid,
        step_order: i64,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            step_order,
            subject: subject.into(),
            body: body.into(),
            background_image: None,
            attachments: Vec::new(),
            delay_days: 1,
            variants: Vec::new(),
        }
    }

    /// Set the delay in days before this step is due.
    pub fn with_delay_days(mut self, days: i64) -> Self {
        self.delay_days = days;
        self
    }

    /// Set the background image URL.
    pub fn with_background_image(mut self, url: impl Into<String>) -> Self {
        self.background_image = Some(url.into());
        self
    }

    /// Set the file attachments.
    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Set the A/B variants.
    pub fn with_variants(mut self, variants: Vec<Variant>) -> Self {
        self.variants = variants;
        self
    }

    /// The step's own content (the "A" arm when variants exist).
    pub fn content(&self) -> StepContent {
        StepContent {
            subject: self.subject.clone(),
            body: self.body.clone(),
            background_image: self.background_image.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// An alternative rendition of a step, competing in an A/B test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant ID.
    pub id: Uuid,
    /// Step this variant belongs to.
    pub step_id: Uuid,
    /// Short label shown in stats (e.g. "B", "C").
    pub name: String,
    /// Subject template.
    pub subject: String,
    /// HTML body template.
    pub body: String,
    /// Optional background image upload URL.
    pub background_image: Option<String>,
    /// File attachments to include.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl Variant {
    /// Create a variant with no background or attachments.
    pub fn new(
        step_id: Uuid,
        name: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id,
            name: name.into(),
            subject: subject.into(),
            body: body.into(),
            background_image: None,
            attachments: Vec::new(),
        }
    }

    /// Set the background image URL.
    pub fn with_background_image(mut self, url: impl Into<String>) -> Self {
        self.background_image = Some(url.into());
        self
    }

    /// Set the file attachments.
    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    /// The variant's renderable content.
    pub fn content(&self) -> StepContent {
        StepContent {
            subject: self.subject.clone(),
            body: self.body.clone(),
            background_image: self.background_image.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Where a lead sits in its campaign's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Never contacted — step one is due immediately.
    Pending,
    /// Mid-sequence, waiting for the next step to come due.
    Sent,
    /// Opened an email.
    Opened,
    /// Replied — sequence stops.
    Replied,
    /// Delivery bounced — sequence stops.
    Bounced,
    /// Opted out — sequence stops.
    Unsubscribed,
    /// Walked off the end of the sequence.
    Completed,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Opened => write!(f, "opened"),
            Self::Replied => write!(f, "replied"),
            Self::Bounced => write!(f, "bounced"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "opened" => Ok(Self::Opened),
            "replied" => Ok(Self::Replied),
            "bounced" => Ok(Self::Bounced),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

/// A prospect moving through a campaign sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead ID.
    pub id: Uuid,
    /// Campaign this lead is enrolled in, if any.
    pub campaign_id: Option<Uuid>,
    /// Recipient address.
    pub email: String,
    /// Short name used for {{leadName}} and first/last splits.
    pub name: Option<String>,
    /// Full name used for {{fullName}}.
    pub full_name: Option<String>,
    /// Company used for {{company}}.
    pub company: Option<String>,
    /// LinkedIn profile URL used for {{linkedinUrl}}.
    pub linkedin_url: Option<String>,
    /// Industry used for {{industry}}.
    pub industry: Option<String>,
    /// Where the lead sits in the sequence.
    pub status: LeadStatus,
    /// Last step that was sent to this lead.
    pub current_step_id: Option<Uuid>,
    /// When the next step comes due. None means due immediately.
    pub next_step_due_at: Option<DateTime<Utc>>,
    /// Token embedded in unsubscribe links. Falls back to the lead ID when absent.
    pub unsubscribe_token: Option<String>,
    /// When the lead was created.
    pub created_at: DateTime<Utc>,
    /// When the lead was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new pending lead not yet enrolled in a campaign.
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id: None,
            email: email.into(),
            name: None,
            full_name: None,
            company: None,
            linkedin_url: None,
            industry: None,
            status: LeadStatus::Pending,
            current_step_id: None,
            next_step_due_at: None,
            unsubscribe_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enroll the lead in a campaign.
    pub fn with_campaign(mut self, campaign_id: Uuid) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    /// Set the short name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the full name.
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Set the company.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Set the LinkedIn URL.
    pub fn with_linkedin_url(mut self, url: impl Into<String>) -> Self {
        self.linkedin_url = Some(url.into());
        self
    }

    /// Set the industry.
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Set the unsubscribe token.
    pub fn with_unsubscribe_token(mut self, token: impl Into<String>) -> Self {
        self.unsubscribe_token = Some(token.into());
        self
    }
}
