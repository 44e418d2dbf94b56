//! Sequence state machine — which step a due lead receives next, and how the
//! lead's row changes after a successful send.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Lead, LeadStatus, Step};

/// What the dispatcher should do with a due lead.
#[derive(Debug)]
pub enum NextAction<'a> {
    /// Send this step.
    Send(&'a Step),
    /// The lead has walked off the end of the sequence.
    Complete,
}

/// Resolve the step a due lead should receive.
///
/// Pending leads get the first step. Sent leads get the successor of their
/// current step. A lead whose current step is the last one, or is no longer
/// in the sequence, is complete.
pub fn resolve_next_step<'a>(lead: &Lead, steps: &'a [Step]) -> NextAction<'a> {
    if lead.status == LeadStatus::Pending {
        return match steps.first() {
            Some(step) => NextAction::Send(step),
            None => NextAction::Complete,
        };
    }

    let Some(current_id) = lead.current_step_id else {
        return NextAction::Complete;
    };

    match steps.iter().position(|s| s.id == current_id) {
        Some(index) => match steps.get(index + 1) {
            Some(next) => NextAction::Send(next),
            None => NextAction::Complete,
        },
        None => NextAction::Complete,
    }
}

/// The successor of a step in the sequence, if any.
pub fn successor_of(steps: &[Step], step_id: Uuid) -> Option<&Step> {
    let index = steps.iter().position(|s| s.id == step_id)?;
    steps.get(index + 1)
}

/// Row changes applied to a lead after a successful send.
#[derive(Debug, Clone)]
pub struct SendTransition {
    pub current_step_id: Uuid,
    pub status: LeadStatus,
    pub next_step_due_at: Option<DateTime<Utc>>,
}

/// Compute the post-send transition. The wait comes from the successor
/// step's delay; a non-positive delay counts as one day. After the last
/// step the schedule is cleared.
pub fn transition_after_send(
    sent: &Step,
    successor: Option<&Step>,
    now: DateTime<Utc>,
) -> SendTransition {
    let next_step_due_at = successor.map(|next| {
        let days = if next.delay_days > 0 {
            next.delay_days
        } else {
            1
        };
        now + Duration::days(days)
    });
    SendTransition {
        current_step_id: sent.id,
        status: LeadStatus::Sent,
        next_step_due_at,
    }
}
