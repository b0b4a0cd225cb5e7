//! Milestone state machine.
//!
//! ```text
//! pending -> funded -> completed -> approved -> released
//!              |           |            |
//!              |           +-> disputed <+
//!              |                 |   |
//!              +-> refunded <----+   +-> approved (resolved for freelancer)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::money::Kobo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Funded,
    Completed,
    Approved,
    Disputed,
    Released,
    Refunded,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Funded => "funded",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Approved => "approved",
            MilestoneStatus::Disputed => "disputed",
            MilestoneStatus::Released => "released",
            MilestoneStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MilestoneStatus::Released | MilestoneStatus::Refunded)
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneAction {
    Fund,
    Complete,
    Approve,
    Release,
    Dispute,
    ResolveForFreelancer,
    Refund,
}

impl MilestoneAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneAction::Fund => "fund",
            MilestoneAction::Complete => "complete",
            MilestoneAction::Approve => "approve",
            MilestoneAction::Release => "release",
            MilestoneAction::Dispute => "dispute",
            MilestoneAction::ResolveForFreelancer => "resolve",
            MilestoneAction::Refund => "refund",
        }
    }

    /// The single status this action starts from, when there is only one.
    pub fn expected_from(&self) -> Option<MilestoneStatus> {
        match self {
            MilestoneAction::Fund => Some(MilestoneStatus::Pending),
            MilestoneAction::Complete => Some(MilestoneStatus::Funded),
            MilestoneAction::Approve => Some(MilestoneStatus::Completed),
            MilestoneAction::Release => Some(MilestoneStatus::Approved),
            MilestoneAction::ResolveForFreelancer => Some(MilestoneStatus::Disputed),
            MilestoneAction::Dispute | MilestoneAction::Refund => None,
        }
    }

    /// Status the action leads to when applied to `from`.
    pub fn apply(&self, from: MilestoneStatus) -> MarketResult<MilestoneStatus> {
        use MilestoneStatus::*;

        let next = match (self, from) {
            (MilestoneAction::Fund, Pending) => Funded,
            (MilestoneAction::Complete, Funded) => Completed,
            (MilestoneAction::Approve, Completed) => Approved,
            (MilestoneAction::Release, Approved) => Released,
            (MilestoneAction::Dispute, Completed | Approved) => Disputed,
            (MilestoneAction::ResolveForFreelancer, Disputed) => Approved,
            (MilestoneAction::Refund, Funded | Disputed) => Refunded,
            _ => {
                return Err(MarketError::InvalidTransition {
                    entity: "milestone",
                    action: self.as_str(),
                    from: from.to_string(),
                })
            }
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub escrow_id: Uuid,
    pub task_id: Uuid,
    pub position: u32,
    pub title: String,
    pub amount: Kobo,
    pub status: MilestoneStatus,
    pub dispute_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    /// Apply the status change and stamp the matching timestamp.
    pub(crate) fn advance(&mut self, next: MilestoneStatus, now: DateTime<Utc>) {
        match next {
            MilestoneStatus::Completed => self.completed_at = Some(now),
            MilestoneStatus::Approved => self.approved_at = Some(now),
            MilestoneStatus::Released | MilestoneStatus::Refunded => self.settled_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
    }
}
