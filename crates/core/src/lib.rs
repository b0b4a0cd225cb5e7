//! Taskmarket Core Library
//!
//! Escrow, withdrawal and identity rules for the freelance marketplace: fee
//! schedules, the milestone state machine, the withdrawal PIN gate and signed
//! vendor webhooks, all behind one in-process [`Marketplace`] service.

pub mod error;
pub mod escrow;
pub mod events;
pub mod fees;
pub mod market;
pub mod milestone;
pub mod models;
pub mod money;
pub mod pin;
mod store;
pub mod webhook;
pub mod withdrawal;

pub use error::{ErrorKind, MarketError, MarketResult};
pub use escrow::{DisputeResolution, Escrow, EscrowStatus, EscrowView, MilestoneInput};
pub use events::MarketEvent;
pub use fees::{EscrowFeeSchedule, FeeQuote, WithdrawalFeeSchedule};
pub use market::{MarketSettings, Marketplace, NewTask};
pub use milestone::{Milestone, MilestoneAction, MilestoneStatus};
pub use models::{Application, ApplicationStatus, KycStatus, Task, TaskStatus, User, UserType};
pub use money::{format_naira, naira, Kobo};
pub use pin::{PinCost, PinOutcome, MAX_PIN_ATTEMPTS};
pub use store::EVENT_LOG_CAPACITY;
pub use webhook::{WebhookOutcome, PAYSTACK_SIGNATURE_HEADER, YOUVERIFY_SIGNATURE_HEADER};
pub use withdrawal::{
    AccountNameLookup, BankAccount, NewBankAccount, StaticAccountDirectory, Wallet,
    WithdrawalRequest, WithdrawalStatus,
};
