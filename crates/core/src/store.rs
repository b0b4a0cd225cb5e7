//! In-process record store.
//!
//! All tables sit behind one `RwLock`. Operations take the write guard once,
//! check their preconditions and write, so a check can never go stale between
//! the read and the write. Status updates go through compare-and-set helpers
//! that fail with [`MarketError::StaleState`] instead of silently skipping.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::escrow::Escrow;
use crate::events::MarketEvent;
use crate::milestone::{Milestone, MilestoneStatus};
use crate::models::{Application, Task, User};
use crate::money::Kobo;
use crate::pin::PinFailures;
use crate::withdrawal::{BankAccount, WithdrawalRequest, WithdrawalStatus};

/// Recent events kept in memory; older ones survive only in the log.
pub const EVENT_LOG_CAPACITY: usize = 1_024;

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub users: HashMap<Uuid, User>,
    pub tasks: HashMap<Uuid, Task>,
    pub applications: HashMap<Uuid, Application>,
    pub escrows: HashMap<Uuid, Escrow>,
    pub milestones: HashMap<Uuid, Milestone>,
    pub bank_accounts: HashMap<Uuid, BankAccount>,
    pub withdrawals: HashMap<Uuid, WithdrawalRequest>,
    pub wallets: HashMap<Uuid, Kobo>,
    pub pins: HashMap<Uuid, String>,
    pub pin_failures: HashMap<Uuid, PinFailures>,
    pub events: VecDeque<MarketEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write()
    }
}

impl Tables {
    pub fn publish(&mut self, event: MarketEvent) {
        tracing::info!(event = event.name(), detail = ?event, "market event");
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn user(&self, id: Uuid) -> MarketResult<&User> {
        self.users.get(&id).ok_or_else(|| MarketError::not_found("user", id))
    }

    pub fn user_mut(&mut self, id: Uuid) -> MarketResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("user", id))
    }

    /// The user, provided identity verification has passed.
    pub fn verified_user(&self, id: Uuid) -> MarketResult<&User> {
        let user = self.user(id)?;
        if !user.is_verified {
            return Err(MarketError::Unverified);
        }
        Ok(user)
    }

    pub fn task(&self, id: Uuid) -> MarketResult<&Task> {
        self.tasks.get(&id).ok_or_else(|| MarketError::not_found("task", id))
    }

    pub fn task_mut(&mut self, id: Uuid) -> MarketResult<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("task", id))
    }

    pub fn application(&self, id: Uuid) -> MarketResult<&Application> {
        self.applications
            .get(&id)
            .ok_or_else(|| MarketError::not_found("application", id))
    }

    pub fn escrow(&self, id: Uuid) -> MarketResult<&Escrow> {
        self.escrows
            .get(&id)
            .ok_or_else(|| MarketError::not_found("escrow", id))
    }

    pub fn milestone(&self, id: Uuid) -> MarketResult<&Milestone> {
        self.milestones
            .get(&id)
            .ok_or_else(|| MarketError::not_found("milestone", id))
    }

    pub fn escrow_milestones(&self, escrow_id: Uuid) -> Vec<Milestone> {
        let mut milestones: Vec<Milestone> = self
            .milestones
            .values()
            .filter(|m| m.escrow_id == escrow_id)
            .cloned()
            .collect();
        milestones.sort_by_key(|m| m.position);
        milestones
    }

    pub fn bank_account(&self, id: Uuid) -> MarketResult<&BankAccount> {
        self.bank_accounts
            .get(&id)
            .ok_or_else(|| MarketError::not_found("bank account", id))
    }

    pub fn withdrawal(&self, id: Uuid) -> MarketResult<&WithdrawalRequest> {
        self.withdrawals
            .get(&id)
            .ok_or_else(|| MarketError::not_found("withdrawal", id))
    }

    /// Fetch a milestone for update, failing when its status differs from
    /// `expected`.
    pub fn milestone_expecting(
        &mut self,
        id: Uuid,
        expected: MilestoneStatus,
    ) -> MarketResult<&mut Milestone> {
        let milestone = self
            .milestones
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("milestone", id))?;
        if milestone.status != expected {
            return Err(MarketError::StaleState {
                entity: "milestone",
                id,
                expected: expected.to_string(),
                actual: milestone.status.to_string(),
            });
        }
        Ok(milestone)
    }

    /// Fetch a withdrawal for update, failing unless its status is one of
    /// `expected`.
    pub fn withdrawal_expecting(
        &mut self,
        id: Uuid,
        expected: &[WithdrawalStatus],
    ) -> MarketResult<&mut WithdrawalRequest> {
        let withdrawal = self
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("withdrawal", id))?;
        if !expected.contains(&withdrawal.status) {
            let expected = expected
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("|");
            return Err(MarketError::StaleState {
                entity: "withdrawal",
                id,
                expected,
                actual: withdrawal.status.to_string(),
            });
        }
        Ok(withdrawal)
    }

    pub fn balance(&self, user_id: Uuid) -> Kobo {
        self.wallets.get(&user_id).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, user_id: Uuid, amount: Kobo) -> MarketResult<Kobo> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(format!(
                "credit must be positive, got {amount}"
            )));
        }
        let balance = self.wallets.entry(user_id).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::Internal("wallet balance overflow".to_string()))?;
        let balance = *balance;
        self.publish(MarketEvent::WalletCredited {
            user_id,
            amount,
            balance,
        });
        Ok(balance)
    }

    pub fn debit(&mut self, user_id: Uuid, amount: Kobo) -> MarketResult<Kobo> {
        if amount <= 0 {
            return Err(MarketError::InvalidAmount(format!(
                "debit must be positive, got {amount}"
            )));
        }
        let available = self.balance(user_id);
        if amount > available {
            return Err(MarketError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let balance = available - amount;
        self.wallets.insert(user_id, balance);
        self.publish(MarketEvent::WalletDebited {
            user_id,
            amount,
            balance,
        });
        Ok(balance)
    }
}
