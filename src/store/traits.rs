//! Backend-agnostic `Store` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Account, Campaign, Lead, Step, Variant};

/// Backend-agnostic store trait covering accounts, campaigns, and leads.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    /// Cheap connectivity probe, run before each dispatch pass.
    async fn health_check(&self) -> Result<(), StoreError>;

    // ── Accounts ────────────────────────────────────────────────────

    /// Insert a new sending account.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Get an account by ID.
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Persist a refreshed token pair in one statement, so the access and
    /// refresh tokens can never be observed half-swapped.
    async fn update_account_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), StoreError>;

    // ── Campaigns ───────────────────────────────────────────────────

    /// Insert a new campaign.
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    /// Insert a sequence step.
    async fn insert_step(&self, step: &Step) -> Result<(), StoreError>;

    /// Insert an A/B variant.
    async fn insert_variant(&self, variant: &Variant) -> Result<(), StoreError>;

    /// Get a campaign by ID with its steps and variants loaded.
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    /// Get all active campaigns with steps (ordered by step_order) and
    /// variants (ordered by name) loaded.
    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, StoreError>;

    /// Bump a campaign's total_sent counter by one.
    async fn increment_sent_counter(&self, campaign_id: Uuid) -> Result<(), StoreError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a new lead.
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError>;

    /// Get a lead by ID.
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// Get leads in a campaign that are due for their next step, up to `limit`.
    ///
    /// A lead is due when its status is pending or sent, and its
    /// next_step_due_at is unset or in the past.
    async fn list_due_leads(&self, campaign_id: Uuid, limit: usize)
        -> Result<Vec<Lead>, StoreError>;

    /// Record a successful send: set the lead's current step, mark it sent,
    /// and schedule (or clear) the next due time.
    async fn mark_step_sent(
        &self,
        lead_id: Uuid,
        step_id: Uuid,
        next_due_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Mark a lead as having finished its sequence.
    async fn mark_completed(&self, lead_id: Uuid) -> Result<(), StoreError>;
}
