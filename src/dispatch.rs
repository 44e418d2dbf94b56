//! Dispatch scheduler — the timer-driven pass that advances campaigns.
//!
//! Each tick:
//! 1. `list_active_campaigns()` with their ordered steps and variants
//! 2. Skip campaigns without a connected account or registered transport
//! 3. `list_due_leads()` per campaign, capped at the configured batch size
//! 4. Per lead: resolve the next step, pick a variant, render, refresh
//!    tokens, send, then record the transition
//!
//! One lead's failure never blocks the rest of the batch. The failed lead
//! keeps its row unchanged, so it stays due and is retried on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::Error;
use crate::models::{Account, Campaign, Lead};
use crate::render::{self, AssetStore};
use crate::sequence::{self, NextAction};
use crate::store::Store;
use crate::transport::{OutgoingEmail, Transport, TransportRegistry};
use crate::variants;

/// Counters for one dispatch pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    /// Active campaigns examined.
    pub campaigns: usize,
    /// Emails delivered.
    pub sent: usize,
    /// Leads that finished their sequence.
    pub completed: usize,
    /// Leads whose send failed and will be retried.
    pub failed: usize,
    /// Campaigns skipped for a missing account or transport.
    pub skipped_campaigns: usize,
}

/// What happened to one due lead.
enum LeadOutcome {
    Sent { step_order: i64, variant: String },
    Completed,
}

/// Timer-driven campaign dispatcher.
pub struct Dispatcher {
    config: EngineConfig,
    store: Arc<dyn Store>,
    transports: Arc<TransportRegistry>,
    assets: AssetStore,
    in_flight: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        transports: Arc<TransportRegistry>,
        assets: AssetStore,
    ) -> Self {
        Self {
            config,
            store,
            transports,
            assets,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one dispatch pass. Returns `None` when the previous pass is still
    /// running; passes never overlap.
    pub async fn tick(&self) -> Option<TickStats> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("Previous dispatch pass still running, skipping tick");
            return None;
        }

        let stats = self.run_pass().await;
        self.in_flight.store(false, Ordering::Release);
        Some(stats)
    }

    async fn run_pass(&self) -> TickStats {
        let mut stats = TickStats::default();

        if let Err(e) = self.store.health_check().await {
            warn!(error = %e, "Store unavailable, skipping dispatch pass");
            return stats;
        }

        let campaigns = match self.store.list_active_campaigns().await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                error!(error = %e, "Failed to load active campaigns");
                return stats;
            }
        };

        for campaign in &campaigns {
            stats.campaigns += 1;
            self.process_campaign(campaign, &mut stats).await;
        }

        if stats.sent > 0 || stats.completed > 0 || stats.failed > 0 {
            info!(
                sent = stats.sent,
                completed = stats.completed,
                failed = stats.failed,
                "Dispatch pass finished"
            );
        }
        stats
    }

    async fn process_campaign(&self, campaign: &Campaign, stats: &mut TickStats) {
        let Some(account_id) = campaign.account_id else {
            warn!(campaign = %campaign.name, "Campaign has no sending account");
            stats.skipped_campaigns += 1;
            return;
        };

        let account = match self.store.get_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(
                    campaign = %campaign.name,
                    account_id = %account_id,
                    "Sending account not found"
                );
                stats.skipped_campaigns += 1;
                return;
            }
            Err(e) => {
                error!(campaign = %campaign.name, error = %e, "Failed to load sending account");
                stats.skipped_campaigns += 1;
                return;
            }
        };
        if !account.is_connected {
            warn!(
                campaign = %campaign.name,
                account = %account.email,
                "Sending account is disconnected"
            );
            stats.skipped_campaigns += 1;
            return;
        }

        let Some(transport) = self.transports.get(account.provider) else {
            warn!(
                campaign = %campaign.name,
                provider = %account.provider,
                "No transport registered for provider"
            );
            stats.skipped_campaigns += 1;
            return;
        };

        let leads = match self
            .store
            .list_due_leads(campaign.id, self.config.lead_batch_size)
            .await
        {
            Ok(leads) => leads,
            Err(e) => {
                error!(campaign = %campaign.name, error = %e, "Failed to load due leads");
                return;
            }
        };
        if leads.is_empty() {
            return;
        }

        debug!(campaign = %campaign.name, due = leads.len(), "Processing due leads");

        // Refreshed tokens propagate to the remaining leads in the batch
        let mut account = account;
        for lead in &leads {
            match self
                .process_lead(campaign, &mut account, &transport, lead)
                .await
            {
                Ok(LeadOutcome::Sent { step_order, variant }) => {
                    info!(
                        campaign = %campaign.name,
                        lead = %lead.email,
                        step = step_order,
                        variant = %variant,
                        "Step sent"
                    );
                    stats.sent += 1;
                }
                Ok(LeadOutcome::Completed) => {
                    info!(campaign = %campaign.name, lead = %lead.email, "Sequence completed");
                    stats.completed += 1;
                }
                Err(e) => {
                    // Lead row untouched, retried next tick
                    error!(
                        campaign = %campaign.name,
                        lead = %lead.email,
                        error = %e,
                        "Failed to process lead"
                    );
                    stats.failed += 1;
                }
            }
        }
    }

    async fn process_lead(
        &self,
        campaign: &Campaign,
        account: &mut Account,
        transport: &Arc<dyn Transport>,
        lead: &Lead,
    ) -> Result<LeadOutcome, Error> {
        let step = match sequence::resolve_next_step(lead, &campaign.steps) {
            NextAction::Send(step) => step,
            NextAction::Complete => {
                self.store.mark_completed(lead.id).await?;
                return Ok(LeadOutcome::Completed);
            }
        };

        // Every send re-rolls the arm; leads are not pinned to a variant
        let selection = {
            let mut rng = rand::thread_rng();
            variants::select(step, &mut rng)
        };

        let rendered = render::render(
            &selection.content,
            lead,
            &self.assets,
            &self.config.public_base_url,
        )
        .await;

        if let Some(pair) = transport.refresh_credentials(account).await? {
            self.store
                .update_account_tokens(account.id, &pair.access_token, &pair.refresh_token)
                .await?;
            account.access_token = pair.access_token;
            account.refresh_token = pair.refresh_token;
        }

        let outgoing = OutgoingEmail {
            to: lead.email.clone(),
            subject: rendered.subject,
            html: rendered.html,
            attachments: rendered.attachments,
        };
        transport.send(account, &outgoing).await?;

        let successor = sequence::successor_of(&campaign.steps, step.id);
        let transition = sequence::transition_after_send(step, successor, Utc::now());
        self.store
            .mark_step_sent(lead.id, step.id, transition.next_step_due_at)
            .await?;
        self.store.increment_sent_counter(campaign.id).await?;

        Ok(LeadOutcome::Sent {
            step_order: step.step_order,
            variant: selection.variant_tag,
        })
    }
}

/// Spawn the dispatch ticker background task.
pub fn spawn_dispatcher(dispatcher: Arc<Dispatcher>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Dispatcher started, ticking every {}s", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            dispatcher.tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    use crate::error::TransportError;
    use crate::models::{CampaignStatus, LeadStatus, Provider, Step};
    use crate::store::LibSqlStore;
    use crate::transport::TokenPair;

    enum RefreshBehavior {
        Noop,
        Rotate(TokenPair),
        Fail,
    }

    /// Transport double that records sends and can be scripted to fail.
    struct RecordingTransport {
        provider: Provider,
        refresh: RefreshBehavior,
        fail_recipients: Vec<String>,
        sent: Mutex<Vec<OutgoingEmail>>,
        seen_tokens: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                provider: Provider::Google,
                refresh: RefreshBehavior::Noop,
                fail_recipients: Vec::new(),
                sent: Mutex::new(Vec::new()),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn refresh_credentials(
            &self,
            _account: &Account,
        ) -> Result<Option<TokenPair>, TransportError> {
            match &self.refresh {
                RefreshBehavior::Noop => Ok(None),
                RefreshBehavior::Rotate(pair) => Ok(Some(pair.clone())),
                RefreshBehavior::Fail => Err(TransportError::RefreshFailed {
                    provider: "google".to_string(),
                    reason: "expired grant".to_string(),
                }),
            }
        }

        async fn send(
            &self,
            account: &Account,
            email: &OutgoingEmail,
        ) -> Result<(), TransportError> {
            if self.fail_recipients.contains(&email.to) {
                return Err(TransportError::SendFailed {
                    provider: "google".to_string(),
                    reason: "mailbox unavailable".to_string(),
                });
            }
            self.seen_tokens
                .lock()
                .unwrap()
                .push(account.access_token.clone());
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    async fn seeded(store: &LibSqlStore) -> (Account, Campaign) {
        let account = Account::new("sender@gmail.test", Provider::Google, "access-1", "refresh-1");
        store.insert_account(&account).await.unwrap();

        let mut campaign = Campaign::new("Spring launch")
            .with_account(account.id)
            .with_status(CampaignStatus::Active);
        store.insert_campaign(&campaign).await.unwrap();

        let step1 = Step::new(
            campaign.id,
            1,
            "Intro {{firstName}}",
            "<p>Hello {{leadName}}</p>",
        );
        let step2 = Step::new(campaign.id, 2, "Follow up", "<p>Checking in</p>").with_delay_days(3);
        store.insert_step(&step1).await.unwrap();
        store.insert_step(&step2).await.unwrap();
        campaign.steps = vec![step1, step2];

        (account, campaign)
    }

    fn dispatcher_with(store: Arc<LibSqlStore>, transport: Arc<dyn Transport>) -> Dispatcher {
        let mut registry = TransportRegistry::new();
        registry.register(transport);
        Dispatcher::new(
            EngineConfig::default(),
            store,
            Arc::new(registry),
            AssetStore::new("uploads"),
        )
    }

    #[tokio::test]
    async fn first_tick_sends_first_step() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;

        let lead = Lead::new("jane@acme.test")
            .with_campaign(campaign.id)
            .with_name("Jane Porter");
        store.insert_lead(&lead).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.campaigns, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@acme.test");
        assert_eq!(sent[0].subject, "Intro Jane");
        assert!(sent[0].html.contains("Hello Jane Porter"));

        let updated = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(updated.status, LeadStatus::Sent);
        assert_eq!(updated.current_step_id, Some(campaign.steps[0].id));
        // Wait comes from the successor step's delay
        let due = updated.next_step_due_at.unwrap();
        let expected = Utc::now() + chrono::Duration::days(3);
        assert!((due - expected).num_seconds().abs() < 5);

        let refreshed = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(refreshed.total_sent, 1);
    }

    #[tokio::test]
    async fn due_lead_past_last_step_completes() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;

        let mut lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        lead.status = LeadStatus::Sent;
        lead.current_step_id = Some(campaign.steps[1].id);
        store.insert_lead(&lead).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.sent, 0);
        assert!(transport.sent().is_empty());

        let updated = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(updated.status, LeadStatus::Completed);
    }

    #[tokio::test]
    async fn send_failure_isolates_lead() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;

        for email in ["a@x.test", "b@x.test", "c@x.test", "d@x.test", "e@x.test"] {
            let lead = Lead::new(email).with_campaign(campaign.id);
            store.insert_lead(&lead).await.unwrap();
        }

        let mut transport = RecordingTransport::new();
        transport.fail_recipients = vec!["b@x.test".to_string()];
        let transport = Arc::new(transport);
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.sent, 4);
        assert_eq!(stats.failed, 1);

        // The failed lead is untouched and still due
        let due = store.list_due_leads(campaign.id, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].email, "b@x.test");
        assert_eq!(due[0].status, LeadStatus::Pending);

        let refreshed = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(refreshed.total_sent, 4);
    }

    #[tokio::test]
    async fn batch_size_caps_leads_per_tick() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;

        for i in 0..15 {
            let lead = Lead::new(format!("lead{i}@x.test")).with_campaign(campaign.id);
            store.insert_lead(&lead).await.unwrap();
        }

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.sent, 10);

        // The leads just sent wait for the follow-up delay; the rest drain
        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.sent, 5);

        let refreshed = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(refreshed.total_sent, 15);
    }

    #[tokio::test]
    async fn rotated_tokens_persist_and_apply() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (account, campaign) = seeded(&store).await;

        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let mut transport = RecordingTransport::new();
        transport.refresh = RefreshBehavior::Rotate(TokenPair {
            access_token: "access-2".to_string(),
            refresh_token: "refresh-2".to_string(),
        });
        let transport = Arc::new(transport);
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        dispatcher.tick().await.unwrap();

        // The send used the fresh token and the store kept the pair
        assert_eq!(
            transport.seen_tokens.lock().unwrap().as_slice(),
            ["access-2"]
        );
        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access-2");
        assert_eq!(stored.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn refresh_failure_aborts_lead() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;

        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let mut transport = RecordingTransport::new();
        transport.refresh = RefreshBehavior::Fail;
        let transport = Arc::new(transport);
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sent, 0);
        assert!(transport.sent().is_empty());

        let untouched = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, LeadStatus::Pending);
    }

    #[tokio::test]
    async fn campaign_without_account_is_skipped() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

        let campaign = Campaign::new("Orphan").with_status(CampaignStatus::Active);
        store.insert_campaign(&campaign).await.unwrap();
        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.skipped_campaigns, 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn campaign_with_missing_account_row_is_skipped() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

        let campaign = Campaign::new("Stale")
            .with_account(Uuid::new_v4())
            .with_status(CampaignStatus::Active);
        store.insert_campaign(&campaign).await.unwrap();
        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.skipped_campaigns, 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn disconnected_account_is_skipped() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

        let mut account = Account::new("sender@gmail.test", Provider::Google, "a", "r");
        account.is_connected = false;
        store.insert_account(&account).await.unwrap();

        let campaign = Campaign::new("Paused sender")
            .with_account(account.id)
            .with_status(CampaignStatus::Active);
        store.insert_campaign(&campaign).await.unwrap();
        store
            .insert_step(&Step::new(campaign.id, 1, "Hi", "<p>Hi</p>"))
            .await
            .unwrap();
        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.skipped_campaigns, 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn provider_without_transport_is_skipped() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());

        let account = Account::new("sender@outlook.test", Provider::Outlook, "a", "r");
        store.insert_account(&account).await.unwrap();

        let campaign = Campaign::new("Outlook only")
            .with_account(account.id)
            .with_status(CampaignStatus::Active);
        store.insert_campaign(&campaign).await.unwrap();
        store
            .insert_step(&Step::new(campaign.id, 1, "Hi", "<p>Hi</p>"))
            .await
            .unwrap();
        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        // Only a Google transport is registered
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher_with(store.clone(), transport.clone());

        let stats = dispatcher.tick().await.unwrap();
        assert_eq!(stats.skipped_campaigns, 1);
        assert!(transport.sent().is_empty());
    }

    /// Transport that blocks inside send() until the test releases it.
    struct GatedTransport {
        entered: Arc<Semaphore>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        fn provider(&self) -> Provider {
            Provider::Google
        }

        async fn refresh_credentials(
            &self,
            _account: &Account,
        ) -> Result<Option<TokenPair>, TransportError> {
            Ok(None)
        }

        async fn send(
            &self,
            _account: &Account,
            _email: &OutgoingEmail,
        ) -> Result<(), TransportError> {
            self.entered.add_permits(1);
            let _permit = self.release.acquire().await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let (_account, campaign) = seeded(&store).await;
        let lead = Lead::new("jane@acme.test").with_campaign(campaign.id);
        store.insert_lead(&lead).await.unwrap();

        let entered = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let transport = Arc::new(GatedTransport {
            entered: entered.clone(),
            release: release.clone(),
        });
        let dispatcher = Arc::new(dispatcher_with(store.clone(), transport));

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.tick().await })
        };

        // Wait until the first pass is blocked mid-send
        entered.acquire().await.unwrap().forget();

        assert!(dispatcher.tick().await.is_none());

        release.add_permits(1);
        let stats = first.await.unwrap().unwrap();
        assert_eq!(stats.sent, 1);

        // With the first pass finished, ticks run again
        assert!(dispatcher.tick().await.is_some());
    }
}
