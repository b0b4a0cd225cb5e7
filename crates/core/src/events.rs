//! Domain events recorded alongside every state change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::milestone::MilestoneStatus;
use crate::models::{ApplicationStatus, KycStatus, TaskStatus};
use crate::money::Kobo;
use crate::withdrawal::WithdrawalStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    UserSignedUp {
        user_id: Uuid,
    },
    VerificationUpdated {
        user_id: Uuid,
        kyc_status: KycStatus,
        is_verified: bool,
    },
    TaskCreated {
        task_id: Uuid,
        client_id: Uuid,
    },
    TaskStatusChanged {
        task_id: Uuid,
        status: TaskStatus,
    },
    ApplicationSubmitted {
        application_id: Uuid,
        task_id: Uuid,
        freelancer_id: Uuid,
    },
    ApplicationStatusChanged {
        application_id: Uuid,
        status: ApplicationStatus,
    },
    EscrowInitialized {
        escrow_id: Uuid,
        task_id: Uuid,
        amount: Kobo,
        fee: Kobo,
        reference: String,
    },
    EscrowFunded {
        escrow_id: Uuid,
        task_id: Uuid,
        amount: Kobo,
    },
    EscrowSettled {
        escrow_id: Uuid,
        released: Kobo,
        refunded: Kobo,
    },
    MilestoneStatusChanged {
        milestone_id: Uuid,
        escrow_id: Uuid,
        from: MilestoneStatus,
        to: MilestoneStatus,
    },
    WalletCredited {
        user_id: Uuid,
        amount: Kobo,
        balance: Kobo,
    },
    WalletDebited {
        user_id: Uuid,
        amount: Kobo,
        balance: Kobo,
    },
    PinConfigured {
        user_id: Uuid,
    },
    PinChanged {
        user_id: Uuid,
    },
    PinLocked {
        user_id: Uuid,
        until: DateTime<Utc>,
    },
    BankAccountAdded {
        bank_account_id: Uuid,
        user_id: Uuid,
        verified: bool,
    },
    WithdrawalRequested {
        withdrawal_id: Uuid,
        user_id: Uuid,
        amount: Kobo,
        fee: Kobo,
        net_amount: Kobo,
    },
    WithdrawalStatusChanged {
        withdrawal_id: Uuid,
        status: WithdrawalStatus,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::UserSignedUp { .. } => "user_signed_up",
            MarketEvent::VerificationUpdated { .. } => "verification_updated",
            MarketEvent::TaskCreated { .. } => "task_created",
            MarketEvent::TaskStatusChanged { .. } => "task_status_changed",
            MarketEvent::ApplicationSubmitted { .. } => "application_submitted",
            MarketEvent::ApplicationStatusChanged { .. } => "application_status_changed",
            MarketEvent::EscrowInitialized { .. } => "escrow_initialized",
            MarketEvent::EscrowFunded { .. } => "escrow_funded",
            MarketEvent::EscrowSettled { .. } => "escrow_settled",
            MarketEvent::MilestoneStatusChanged { .. } => "milestone_status_changed",
            MarketEvent::WalletCredited { .. } => "wallet_credited",
            MarketEvent::WalletDebited { .. } => "wallet_debited",
            MarketEvent::PinConfigured { .. } => "pin_configured",
            MarketEvent::PinChanged { .. } => "pin_changed",
            MarketEvent::PinLocked { .. } => "pin_locked",
            MarketEvent::BankAccountAdded { .. } => "bank_account_added",
            MarketEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            MarketEvent::WithdrawalStatusChanged { .. } => "withdrawal_status_changed",
        }
    }
}
