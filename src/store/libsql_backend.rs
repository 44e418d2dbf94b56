//! libSQL backend — async `Store` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Account, Campaign, CampaignStatus, Lead, LeadStatus, Provider, Step, Variant};
use crate::store::migrations;
use crate::store::traits::Store;

/// libSQL store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Load a campaign's steps, ordered by step_order, with variants attached.
    async fn load_steps(&self, campaign_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM campaign_steps WHERE campaign_id = ?1 ORDER BY step_order ASC"
                ),
                params![campaign_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_steps: {e}")))?;

        let mut steps = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_step(&row) {
                Ok(step) => steps.push(step),
                Err(e) => {
                    tracing::warn!("Skipping step row: {e}");
                }
            }
        }

        for step in &mut steps {
            step.variants = self.load_variants(step.id).await?;
        }
        Ok(steps)
    }

    /// Load a step's variants, ordered by name.
    async fn load_variants(&self, step_id: Uuid) -> Result<Vec<Variant>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {VARIANT_COLUMNS} FROM step_variants WHERE step_id = ?1 ORDER BY name ASC"
                ),
                params![step_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("load_variants: {e}")))?;

        let mut variants = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_variant(&row) {
                Ok(variant) => variants.push(variant),
                Err(e) => {
                    tracing::warn!("Skipping variant row: {e}");
                }
            }
        }
        Ok(variants)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    // Try SQLite datetime() output without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert a CampaignStatus to its DB string.
fn campaign_status_to_str(status: &CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Draft => "draft",
        CampaignStatus::Active => "active",
        CampaignStatus::Paused => "paused",
        CampaignStatus::Completed => "completed",
    }
}

/// Parse a DB string into a CampaignStatus. Unknown values become Draft.
fn str_to_campaign_status(s: &str) -> CampaignStatus {
    match s {
        "active" => CampaignStatus::Active,
        "paused" => CampaignStatus::Paused,
        "completed" => CampaignStatus::Completed,
        _ => CampaignStatus::Draft,
    }
}

/// Convert a LeadStatus to its DB string.
fn lead_status_to_str(status: &LeadStatus) -> &'static str {
    match status {
        LeadStatus::Pending => "pending",
        LeadStatus::Sent => "sent",
        LeadStatus::Opened => "opened",
        LeadStatus::Replied => "replied",
        LeadStatus::Bounced => "bounced",
        LeadStatus::Unsubscribed => "unsubscribed",
        LeadStatus::Completed => "completed",
    }
}

/// Parse a DB string into a LeadStatus. Unknown values become Pending.
fn str_to_lead_status(s: &str) -> LeadStatus {
    match s {
        "sent" => LeadStatus::Sent,
        "opened" => LeadStatus::Opened,
        "replied" => LeadStatus::Replied,
        "bounced" => LeadStatus::Bounced,
        "unsubscribed" => LeadStatus::Unsubscribed,
        "completed" => LeadStatus::Completed,
        _ => LeadStatus::Pending,
    }
}

/// Wrap a libsql row-read error as a query error.
fn row_err(e: libsql::Error) -> StoreError {
    StoreError::Query(format!("row parse: {e}"))
}

/// Map a libsql Row to an Account.
///
/// Column order matches ACCOUNT_COLUMNS:
/// 0:id, 1:email, 2:provider, 3:access_token, 4:refresh_token,
/// 5:is_connected, 6:created_at, 7:updated_at
fn row_to_account(row: &libsql::Row) -> Result<Account, StoreError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let email: String = row.get(1).map_err(row_err)?;
    let provider_str: String = row.get(2).map_err(row_err)?;
    let access_token: String = row.get(3).map_err(row_err)?;
    let refresh_token: String = row.get(4).map_err(row_err)?;
    let is_connected: i64 = row.get(5).map_err(row_err)?;
    let created_str: String = row.get(6).map_err(row_err)?;
    let updated_str: String = row.get(7).map_err(row_err)?;

    // No safe fallback for an unknown provider: the row routes real sends.
    let provider: Provider = provider_str.parse().map_err(StoreError::Serialization)?;

    Ok(Account {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        email,
        provider,
        access_token,
        refresh_token,
        is_connected: is_connected != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a Campaign with no steps loaded.
fn row_to_campaign(row: &libsql::Row) -> Result<Campaign, StoreError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let name: String = row.get(1).map_err(row_err)?;
    let status_str: String = row.get(2).map_err(row_err)?;
    let account_id_str: Option<String> = row.get(3).ok();
    let total_sent: i64 = row.get(4).map_err(row_err)?;
    let total_opened: i64 = row.get(5).map_err(row_err)?;
    let total_replied: i64 = row.get(6).map_err(row_err)?;
    let created_str: String = row.get(7).map_err(row_err)?;
    let updated_str: String = row.get(8).map_err(row_err)?;

    Ok(Campaign {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name,
        status: str_to_campaign_status(&status_str),
        account_id: account_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        total_sent,
        total_opened,
        total_replied,
        steps: Vec::new(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a Step with no variants loaded.
fn row_to_step(row: &libsql::Row) -> Result<Step, StoreError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let campaign_id_str: String = row.get(1).map_err(row_err)?;
    let step_order: i64 = row.get(2).map_err(row_err)?;
    let subject: String = row.get(3).map_err(row_err)?;
    let body: String = row.get(4).map_err(row_err)?;
    let background_image: Option<String> = row.get(5).ok();
    let attachments_json: String = row.get(6).map_err(row_err)?;
    let delay_days: i64 = row.get(7).map_err(row_err)?;

    Ok(Step {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        campaign_id: Uuid::parse_str(&campaign_id_str).unwrap_or_else(|_| Uuid::nil()),
        step_order,
        subject,
        body,
        background_image,
        attachments: serde_json::from_str(&attachments_json).unwrap_or_default(),
        delay_days,
        variants: Vec::new(),
    })
}

/// Map a libsql Row to a Variant.
fn row_to_variant(row: &libsql::Row) -> Result<Variant, StoreError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let step_id_str: String = row.get(1).map_err(row_err)?;
    let name: String = row.get(2).map_err(row_err)?;
    let subject: String = row.get(3).map_err(row_err)?;
    let body: String = row.get(4).map_err(row_err)?;
    let background_image: Option<String> = row.get(5).ok();
    let attachments_json: String = row.get(6).map_err(row_err)?;

    Ok(Variant {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        step_id: Uuid::parse_str(&step_id_str).unwrap_or_else(|_| Uuid::nil()),
        name,
        subject,
        body,
        background_image,
        attachments: serde_json::from_str(&attachments_json).unwrap_or_default(),
    })
}

/// Map a libsql Row to a Lead.
///
/// Column order matches LEAD_COLUMNS:
/// 0:id, 1:campaign_id, 2:email, 3:name, 4:full_name, 5:company,
/// 6:linkedin_url, 7:industry, 8:status, 9:current_step_id,
/// 10:next_step_due_at, 11:unsubscribe_token, 12:created_at, 13:updated_at
fn row_to_lead(row: &libsql::Row) -> Result<Lead, StoreError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let campaign_id_str: Option<String> = row.get(1).ok();
    let email: String = row.get(2).map_err(row_err)?;
    let name: Option<String> = row.get(3).ok();
    let full_name: Option<String> = row.get(4).ok();
    let company: Option<String> = row.get(5).ok();
    let linkedin_url: Option<String> = row.get(6).ok();
    let industry: Option<String> = row.get(7).ok();
    let status_str: String = row.get(8).map_err(row_err)?;
    let current_step_id_str: Option<String> = row.get(9).ok();
    let next_due_str: Option<String> = row.get(10).ok();
    let unsubscribe_token: Option<String> = row.get(11).ok();
    let created_str: String = row.get(12).map_err(row_err)?;
    let updated_str: String = row.get(13).map_err(row_err)?;

    Ok(Lead {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        campaign_id: campaign_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        email,
        name,
        full_name,
        company,
        linkedin_url,
        industry,
        status: str_to_lead_status(&status_str),
        current_step_id: current_step_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        next_step_due_at: parse_optional_datetime(&next_due_str),
        unsubscribe_token,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

const ACCOUNT_COLUMNS: &str =
    "id, email, provider, access_token, refresh_token, is_connected, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str =
    "id, name, status, account_id, total_sent, total_opened, total_replied, created_at, updated_at";

const STEP_COLUMNS: &str =
    "id, campaign_id, step_order, subject, body, background_image, attachments, delay_days";

const VARIANT_COLUMNS: &str = "id, step_id, name, subject, body, background_image, attachments";

const LEAD_COLUMNS: &str = "id, campaign_id, email, name, full_name, company, linkedin_url, industry, status, current_step_id, next_step_due_at, unsubscribe_token, created_at, updated_at";

#[async_trait]
impl Store for LibSqlStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.conn()
            .query("SELECT 1", ())
            .await
            .map_err(|e| StoreError::Connection(format!("health_check: {e}")))?;
        Ok(())
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO accounts (id, email, provider, access_token, refresh_token, is_connected, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.id.to_string(),
                account.email.as_str(),
                account.provider.as_str(),
                account.access_token.as_str(),
                account.refresh_token.as_str(),
                account.is_connected as i64,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("insert_account: {e}")))?;

        debug!(account_id = %account.id, provider = %account.provider, "Account inserted into DB");
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_account: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_account(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_account: {e}"))),
        }
    }

    async fn update_account_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE accounts SET access_token = ?1, refresh_token = ?2, updated_at = ?3 WHERE id = ?4",
            params![access_token, refresh_token, now, id.to_string()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("update_account_tokens: {e}")))?;

        debug!(account_id = %id, "Account tokens updated in DB");
        Ok(())
    }

    // ── Campaigns ───────────────────────────────────────────────────

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO campaigns (id, name, status, account_id, total_sent, total_opened, total_replied, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                campaign.id.to_string(),
                campaign.name.as_str(),
                campaign_status_to_str(&campaign.status),
                opt_text_owned(campaign.account_id.map(|u| u.to_string())),
                campaign.total_sent,
                campaign.total_opened,
                campaign.total_replied,
                campaign.created_at.to_rfc3339(),
                campaign.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("insert_campaign: {e}")))?;

        debug!(campaign_id = %campaign.id, "Campaign inserted into DB");
        Ok(())
    }

    async fn insert_step(&self, step: &Step) -> Result<(), StoreError> {
        let conn = self.conn();
        let attachments_json =
            serde_json::to_string(&step.attachments).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO campaign_steps (id, campaign_id, step_order, subject, body, background_image, attachments, delay_days) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                step.id.to_string(),
                step.campaign_id.to_string(),
                step.step_order,
                step.subject.as_str(),
                step.body.as_str(),
                opt_text_owned(step.background_image.clone()),
                attachments_json,
                step.delay_days,
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("insert_step: {e}")))?;

        debug!(step_id = %step.id, campaign_id = %step.campaign_id, "Step inserted into DB");
        Ok(())
    }

    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        let conn = self.conn();
        let attachments_json =
            serde_json::to_string(&variant.attachments).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO step_variants (id, step_id, name, subject, body, background_image, attachments) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                variant.id.to_string(),
                variant.step_id.to_string(),
                variant.name.as_str(),
                variant.subject.as_str(),
                variant.body.as_str(),
                opt_text_owned(variant.background_image.clone()),
                attachments_json,
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("insert_variant: {e}")))?;

        debug!(variant_id = %variant.id, step_id = %variant.step_id, "Variant inserted into DB");
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_campaign: {e}")))?;

        let mut campaign = match rows.next().await {
            Ok(Some(row)) => row_to_campaign(&row)?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Query(format!("get_campaign: {e}"))),
        };

        campaign.steps = self.load_steps(campaign.id).await?;
        Ok(Some(campaign))
    }

    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = 'active' ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_active_campaigns: {e}")))?;

        let mut campaigns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_campaign(&row) {
                Ok(campaign) => campaigns.push(campaign),
                Err(e) => {
                    tracing::warn!("Skipping campaign row: {e}");
                }
            }
        }

        for campaign in &mut campaigns {
            campaign.steps = self.load_steps(campaign.id).await?;
        }
        Ok(campaigns)
    }

    async fn increment_sent_counter(&self, campaign_id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE campaigns SET total_sent = total_sent + 1, updated_at = ?1 WHERE id = ?2",
            params![now, campaign_id.to_string()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("increment_sent_counter: {e}")))?;
        Ok(())
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO leads (id, campaign_id, email, name, full_name, company, linkedin_url, industry, status, current_step_id, next_step_due_at, unsubscribe_token, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                lead.id.to_string(),
                opt_text_owned(lead.campaign_id.map(|u| u.to_string())),
                lead.email.as_str(),
                opt_text_owned(lead.name.clone()),
                opt_text_owned(lead.full_name.clone()),
                opt_text_owned(lead.company.clone()),
                opt_text_owned(lead.linkedin_url.clone()),
                opt_text_owned(lead.industry.clone()),
                lead_status_to_str(&lead.status),
                opt_text_owned(lead.current_step_id.map(|u| u.to_string())),
                opt_text_owned(lead.next_step_due_at.map(|d| d.to_rfc3339())),
                opt_text_owned(lead.unsubscribe_token.clone()),
                lead.created_at.to_rfc3339(),
                lead.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("insert_lead: {e}")))?;

        debug!(lead_id = %lead.id, email = %lead.email, "Lead inserted into DB");
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_lead: {e}"))),
        }
    }

    async fn list_due_leads(
        &self,
        campaign_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Lead>, StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE campaign_id = ?1 AND status IN ('pending', 'sent') AND (next_step_due_at IS NULL OR next_step_due_at <= ?2) ORDER BY created_at ASC LIMIT ?3"
                ),
                params![campaign_id.to_string(), now, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_due_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => {
                    tracing::warn!("Skipping lead row: {e}");
                }
            }
        }
        Ok(leads)
    }

    async fn mark_step_sent(
        &self,
        lead_id: Uuid,
        step_id: Uuid,
        next_due_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE leads SET status = 'sent', current_step_id = ?1, next_step_due_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                step_id.to_string(),
                opt_text_owned(next_due_at.map(|d| d.to_rfc3339())),
                now,
                lead_id.to_string(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("mark_step_sent: {e}")))?;

        debug!(lead_id = %lead_id, step_id = %step_id, "Lead step recorded");
        Ok(())
    }

    async fn mark_completed(&self, lead_id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE leads SET status = 'completed', updated_at = ?1 WHERE id = ?2",
            params![now, lead_id.to_string()],
        )
        .await
        .map_err(|e| StoreError::Query(format!("mark_completed: {e}")))?;

        debug!(lead_id = %lead_id, "Lead sequence completed");
        Ok(())
    }
}
